use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, INDEX_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

/// One parsed line of session input.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args.get(key).and_then(Value::as_str)
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = RAW_ARG_COMMANDS.iter().find(|spec| spec.command == command) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .command_args
                    .insert(spec.key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, INDEX_COMMANDS) {
                let mut intent = Intent::new(action, text);
                let index = arg
                    .parse::<u64>()
                    .map(|value| Value::Number(value.into()))
                    .unwrap_or(Value::Null);
                intent.command_args.insert("index".to_string(), index);
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::parse_intent;

    #[test]
    fn parse_image_paths_with_quotes() {
        let intent = parse_intent("/image1 \"/tmp/my photo.png\"");
        assert_eq!(intent.action, "select_image1");
        assert_eq!(intent.command_args["path"], json!("/tmp/my photo.png"));

        let second = parse_intent("/image2 b.jpg");
        assert_eq!(second.action, "select_image2");
        assert_eq!(second.arg_str("path"), Some("b.jpg"));
    }

    #[test]
    fn parse_raw_argument_commands() {
        let mode = parse_intent("/mode edit");
        assert_eq!(mode.action, "set_mode");
        assert_eq!(mode.command_args["mode"], json!("edit"));

        let prompt = parse_intent("/prompt  a cat wearing \"sunglasses\" ");
        assert_eq!(prompt.action, "set_prompt");
        assert_eq!(prompt.arg_str("text"), Some("a cat wearing \"sunglasses\""));

        let negative = parse_intent("/negative");
        assert_eq!(negative.action, "set_negative_prompt");
        assert_eq!(negative.arg_str("text"), Some(""));

        let strength = parse_intent("/STRENGTH 40");
        assert_eq!(strength.action, "set_strength");
        assert_eq!(strength.arg_str("strength"), Some("40"));
    }

    #[test]
    fn parse_history_index() {
        assert_eq!(parse_intent("/show 3").command_args["index"], json!(3));
        assert_eq!(parse_intent("/show three").command_args["index"], Value::Null);
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/generate").action, "generate");
        assert_eq!(parse_intent("/use").action, "use_result");
        assert_eq!(parse_intent("/exit").action, "quit");
        assert_eq!(parse_intent("/clear2").action, "clear_image2");
    }

    #[test]
    fn plain_text_generates_with_prompt() {
        let intent = parse_intent("  make it snow  ");
        assert_eq!(intent.action, "generate");
        assert_eq!(intent.prompt.as_deref(), Some("make it snow"));
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
