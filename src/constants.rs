pub(crate) const DEFAULT_CONTROLLER_BIN: &str = "argocd";
pub(crate) const DEFAULT_PATCH_BIN: &str = "kubectl";
pub(crate) const DEFAULT_CONNECTIONS_FILE: &str = ".argocd_urls.json";
pub(crate) const DEFAULT_APP_NAMESPACE: &str = "argocd";

pub(crate) const DEFAULT_CONNECTIONS: &[(&str, &str)] = &[
    (
        "paywell-prod",
        "argocd login argocd.k8s.pay-well.sk --sso --skip-test-tls --grpc-web --insecure",
    ),
    (
        "paywell-acc",
        "argocd login argocd.k8s-acc.pay-well.sk --sso --skip-test-tls --grpc-web --insecure",
    ),
];

pub(crate) const LOGIN_VERB: &str = "login";
pub(crate) const SERVER_FLAG: &str = "--server";
pub(crate) const AUTH_TOKEN_FLAG: &str = "--auth-token";
pub(crate) const FORWARDABLE_FLAGS: &[&str] = &[
    "--grpc-web",
    "--insecure",
    AUTH_TOKEN_FLAG,
    "--port-forward",
    "--plaintext",
];
pub(crate) const SERVER_PLACEHOLDER: &str = "<server>";
pub(crate) const REDACTED_VALUE: &str = "<redacted>";

/// Lowercase substrings that mark a controller error as an expired or missing session.
pub(crate) const AUTH_FAILURE_PATTERNS: &[&str] = &[
    "unauthenticated",
    "invalid session",
    "rpc error: code = unauthenticated",
    "invalid_grant",
    "invalid refresh token",
    "oauth2",
];

pub(crate) const PRODUCTION_MARKER: &str = "prod";
pub(crate) const FUZZY_MATCH_THRESHOLD: f64 = 0.6;

pub(crate) const COMMAND_TIMEOUT_SECS: u64 = 30;
pub(crate) const SYNC_TIMEOUT_SECS: u64 = 300;
pub(crate) const LOGIN_CHECK_TIMEOUT_SECS: u64 = 5;
pub(crate) const LOGIN_POLL_ATTEMPTS: u32 = 15;
pub(crate) const LOGIN_POLL_DELAY_SECS: u64 = 2;
pub(crate) const SYNC_BATCH_DELAY_SECS: u64 = 1;
pub(crate) const WATCH_INTERVAL_SECS: u64 = 5;
pub(crate) const PROCESS_WAIT_INTERVAL_MILLIS: u64 = 50;

pub(crate) const APPLICATION_RESOURCE: &str = "applications.argoproj.io";
pub(crate) const APPLICATION_RESOURCE_FALLBACK: &str = "applications";

pub(crate) const EXIT_INTERRUPTED: i32 = 130;
