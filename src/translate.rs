//! Turns a stored `argocd login ...` command into the connection flags that
//! may be forwarded to other controller subcommands.

use crate::constants::{AUTH_TOKEN_FLAG, FORWARDABLE_FLAGS, LOGIN_VERB, SERVER_FLAG};
use crate::error::ManagerError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedConnection {
    pub(crate) server_url: Option<String>,
    pub(crate) forwardable_flags: Vec<String>,
}

/// Login-only flags (`--sso`, `--skip-test-tls`, ...) are dropped.
pub(crate) fn parse_login_command(
    cluster: &str,
    login_command: &str,
) -> Result<ParsedConnection, ManagerError> {
    let tokens = login_command.split_whitespace().collect::<Vec<_>>();
    let Some(login_at) = tokens.iter().position(|token| *token == LOGIN_VERB) else {
        return Err(ManagerError::MalformedLoginCommand(cluster.to_string()));
    };

    let mut rest = tokens[login_at + 1..].iter().peekable();
    let server_url = rest
        .next_if(|token| !token.starts_with("--"))
        .map(|token| (*token).to_string());

    let mut forwardable_flags = Vec::new();
    while let Some(token) = rest.next() {
        if !FORWARDABLE_FLAGS.contains(token) {
            continue;
        }
        forwardable_flags.push((*token).to_string());
        if *token == AUTH_TOKEN_FLAG
            && let Some(value) = rest.next_if(|value| !value.starts_with("--"))
        {
            forwardable_flags.push((*value).to_string());
        }
    }

    Ok(ParsedConnection {
        server_url,
        forwardable_flags,
    })
}

pub(crate) fn build_controller_argv(
    controller_bin: &str,
    parsed: &ParsedConnection,
    args: &[String],
) -> Vec<String> {
    let mut argv = Vec::with_capacity(1 + args.len() + 2 + parsed.forwardable_flags.len());
    argv.push(controller_bin.to_string());
    argv.extend(args.iter().cloned());
    if let Some(server_url) = &parsed.server_url {
        argv.push(SERVER_FLAG.to_string());
        argv.push(server_url.clone());
    }
    argv.extend(parsed.forwardable_flags.iter().cloned());
    argv
}

pub(crate) fn translate(
    controller_bin: &str,
    cluster: &str,
    login_command: &str,
    args: &[String],
) -> Result<(ParsedConnection, Vec<String>), ManagerError> {
    let parsed = parse_login_command(cluster, login_command)?;
    let argv = build_controller_argv(controller_bin, &parsed, args);
    Ok((parsed, argv))
}
