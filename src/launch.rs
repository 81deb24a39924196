use std::sync::OnceLock;

use regex::Regex;

/// Environment variable carrying the agent's OAuth token on the pod.
pub const AGENT_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Escape a prompt for safe embedding between single quotes in `bash -c`.
#[must_use]
pub fn escape_single_quotes(input: &str) -> String {
    input.replace('\'', "'\\''")
}

/// Build the remote shell command for one agent turn.
///
/// The working directory is created on demand because pods are ephemeral; the
/// resume flag is only present when a session id hint exists.
#[must_use]
pub fn agent_turn_command(
    working_directory: &str,
    agent_command: &str,
    prompt: &str,
    resume_session_id: Option<&str>,
) -> String {
    let escaped = escape_single_quotes(prompt);
    let mut command = format!(
        "mkdir -p {working_directory} && cd {working_directory} && {agent_command} -p --verbose --output-format stream-json --dangerously-skip-permissions"
    );

    if let Some(session_id) = resume_session_id {
        command.push_str(" --resume ");
        command.push_str(session_id);
    }

    command.push_str(" '");
    command.push_str(&escaped);
    command.push('\'');
    command
}

/// Prefix a command with the agent token export, for transports that cannot
/// carry environment out-of-band.
#[must_use]
pub fn with_token_export(command: &str, agent_token: &str) -> String {
    format!("export {AGENT_TOKEN_ENV}={agent_token} && {command}")
}

fn token_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(&format!(r"{AGENT_TOKEN_ENV}(?:=|%3D)[^\s&']+"))
            .expect("token redaction regex must compile")
    })
}

/// Redact the agent token wherever a command string is logged; covers both
/// the plain and the percent-encoded (`%3D`) forms.
#[must_use]
pub fn redact_secrets(input: &str) -> String {
    token_regex()
        .replace_all(input, format!("{AGENT_TOKEN_ENV}=<redacted>"))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::{
        agent_turn_command, escape_single_quotes, redact_secrets, with_token_export,
        AGENT_TOKEN_ENV,
    };

    #[test]
    fn prompts_with_single_quotes_are_escaped() {
        assert_eq!(escape_single_quotes("don't"), "don'\\''t");
        assert_eq!(escape_single_quotes("plain"), "plain");
    }

    #[test]
    fn turn_command_prepares_the_working_directory() {
        let command = agent_turn_command("/work", "claude", "fix it", None);
        assert!(command.starts_with("mkdir -p /work && cd /work && claude -p"));
        assert!(command.contains("--output-format stream-json"));
        assert!(command.ends_with("'fix it'"));
        assert!(!command.contains("--resume"));
    }

    #[test]
    fn resume_hint_adds_the_resume_flag() {
        let command = agent_turn_command("/work", "claude", "continue", Some("s-123"));
        assert!(command.contains("--resume s-123"));
    }

    #[test]
    fn escaped_prompt_survives_command_assembly() {
        let command = agent_turn_command("/work", "claude", "don't break", None);
        assert!(command.ends_with("'don'\\''t break'"));
    }

    #[test]
    fn token_export_prefixes_the_command() {
        let command = with_token_export("claude -p 'hello'", "sk-tok");
        assert_eq!(command, format!("export {AGENT_TOKEN_ENV}=sk-tok && claude -p 'hello'"));
    }

    #[test]
    fn redacts_equals_sign_token() {
        let input = format!("{AGENT_TOKEN_ENV}=sk-ant-secret123");
        assert_eq!(redact_secrets(&input), format!("{AGENT_TOKEN_ENV}=<redacted>"));
    }

    #[test]
    fn redacts_percent_encoded_token() {
        let input = format!("{AGENT_TOKEN_ENV}%3Dsk-ant-secret123");
        assert_eq!(redact_secrets(&input), format!("{AGENT_TOKEN_ENV}=<redacted>"));
    }

    #[test]
    fn leaves_commands_without_tokens_unchanged() {
        assert_eq!(redact_secrets("some normal command string"), "some normal command string");
    }

    #[test]
    fn redacts_token_embedded_in_longer_command() {
        let input = format!("export {AGENT_TOKEN_ENV}=sk-ant-secret123 && claude -p 'hello'");
        assert_eq!(
            redact_secrets(&input),
            format!("export {AGENT_TOKEN_ENV}=<redacted> && claude -p 'hello'")
        );
    }
}
