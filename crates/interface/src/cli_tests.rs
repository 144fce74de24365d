//! CLI Tests

#[cfg(test)]
mod tests {
    use crate::cli::{CliConfig, CliError, check_specs, replay};
    use crate::console::ConsoleSink;
    use crate::file_services::{EmptyLogService, JsonlLogService, ScriptedContentService};
    use crate::script::parse_script;
    use chatbox_core::{ChatboxConfig, ChatboxError, SharedContentService, SharedLogService};
    use std::error::Error;
    use std::io::Write;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::task::LocalSet;

    /// Test CliError display implementations
    #[test]
    fn test_cli_error_display() {
        let error = CliError::Config("bad yaml".to_string());
        assert_eq!(format!("{}", error), "Config error: bad yaml");

        let error = CliError::InvalidSpec {
            line: 4,
            message: "Unknown message type: video".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Invalid spec at line 4: Unknown message type: video"
        );
    }

    /// Test CliError source chain
    #[test]
    fn test_cli_error_source() {
        let error = CliError::Io("missing".to_string());
        assert!(error.source().is_none());
    }

    /// Test conversion from core errors
    #[test]
    fn test_cli_error_from_core() {
        let error: CliError = ChatboxError::Service("offline".to_string()).into();
        assert_eq!(error, CliError::Chatbox("Service error: offline".to_string()));
    }

    /// Test CliConfig default
    #[test]
    fn test_cli_config_default() {
        let config = CliConfig::default();
        assert!(config.config_path.is_none());
        assert!(!config.verbose);
        assert_eq!(config.load_chatbox_config().unwrap().display.wrap_width, 30);
    }

    /// Test CliConfig with a missing config file
    #[test]
    fn test_cli_config_missing_file() {
        let config = CliConfig {
            config_path: Some(PathBuf::from("/nonexistent/chatbox.yaml")),
            verbose: false,
        };
        assert!(matches!(config.load_chatbox_config(), Err(CliError::Config(_))));
    }

    /// Test spec checking counts valid lines
    #[test]
    fn test_check_specs_ok() {
        let raw = r#"{"type": "scrolled", "text": "Hi"}

{"type": "choice", "settings": {"a": {"text": "A"}}}
{"type": "external_events"}
"#;
        assert_eq!(check_specs(raw).unwrap(), 3);
    }

    /// Test spec checking stops at the first bad line
    #[test]
    fn test_check_specs_reports_line() {
        let raw = "{\"type\": \"scrolled\", \"text\": \"Hi\"}\n{\"type\": \"console\", \"settings\": {}}\n{\"type\": \"video\"}\n";
        match check_specs(raw) {
            Err(CliError::InvalidSpec { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("settings.showmehow_id"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// Test a full replay through the console sink
    #[tokio::test(start_paused = true)]
    async fn test_replay_script() {
        let script = parse_script(
            r#"
{"event": "chat_message", "actor": "alice", "location": "intro::1", "spec": {"type": "scrolled", "text": "Welcome"}}
{"event": "user_input_bubble", "actor": "alice", "location": "intro::1", "spec": {"type": "text", "settings": {"showmehow_id": "name"}}}
{"delay_ms": 3000, "event": "respond", "actor": "alice", "interaction": {"kind": "submit", "value": "Ada"}}
"#,
        )
        .unwrap();
        let story = ScriptedContentService::from_yaml_str(
            "locations:\n  \"intro::1\":\n    responses:\n      \"*\":\n        reply: \"Nice to meet you\"\n",
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut history = std::fs::File::create(dir.path().join("alice.jsonl")).unwrap();
        writeln!(
            history,
            r#"{{"sender": "actor", "location": "intro::0", "spec": {{"type": "scrolled", "text": "Earlier"}}}}"#
        )
        .unwrap();

        let content: SharedContentService = Arc::new(story);
        let log: SharedLogService = Arc::new(JsonlLogService::new(dir.path()));
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Rc::new(ConsoleSink::with_output(Vec::new(), tx, 30));

        LocalSet::new()
            .run_until(replay(
                script,
                Some("alice".to_string()),
                sink.clone(),
                rx,
                (content, log),
                ChatboxConfig::default(),
            ))
            .await
            .unwrap();

        let output = sink.contents();
        let earlier = output.find("[alice] Earlier").unwrap();
        let welcome = output.find("[alice] Welcome").unwrap();
        let answer = output.find("[you] Ada").unwrap();
        let reply = output.find("[alice] Nice to meet you").unwrap();
        assert!(earlier < welcome && welcome < answer && answer < reply);
        assert!(output.contains("[alice ?] > (text input 'name')"));
    }

    /// Test replay with a protocol error in the script
    #[tokio::test(start_paused = true)]
    async fn test_replay_protocol_error() {
        let script = parse_script(
            r#"{"event": "chat_message", "actor": "bob", "location": "a::0", "spec": {"type": "video"}}"#,
        )
        .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Rc::new(ConsoleSink::with_output(Vec::new(), tx, 30));
        let content: SharedContentService = Arc::new(ScriptedContentService::default());
        let log: SharedLogService = Arc::new(EmptyLogService);

        let result = LocalSet::new()
            .run_until(replay(script, None, sink, rx, (content, log), ChatboxConfig::default()))
            .await;
        assert_eq!(
            result,
            Err(CliError::Chatbox("Unknown message type: video".to_string()))
        );
    }
}
