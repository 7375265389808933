use crate::constants::{AUTH_TOKEN_FLAG, REDACTED_VALUE};

pub(crate) fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || "@%_+=:,./-".contains(ch))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

/// Like [`shell_join`], but hides the value following `--auth-token`.
pub(crate) fn loggable_command(args: &[String]) -> String {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            masked.push(REDACTED_VALUE.to_string());
            hide_next = false;
            continue;
        }
        hide_next = arg == AUTH_TOKEN_FLAG;
        masked.push(arg.clone());
    }
    shell_join(&masked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("app"), "app");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(
            shell_quote(r#"{"spec":{}}"#),
            r#"'{"spec":{}}'"#
        );
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_loggable_command_masks_auth_token() {
        let args = ["argocd", "app", "list", "--auth-token", "s3cret", "--grpc-web"]
            .iter()
            .map(|arg| (*arg).to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            loggable_command(&args),
            "argocd app list --auth-token '<redacted>' --grpc-web"
        );
    }
}
