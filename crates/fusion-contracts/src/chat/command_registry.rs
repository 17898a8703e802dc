#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose argument is taken verbatim, stored under `key`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawArgSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[RawArgSpec] = &[
    RawArgSpec {
        command: "mode",
        action: "set_mode",
        key: "mode",
    },
    RawArgSpec {
        command: "style",
        action: "set_style",
        key: "style",
    },
    RawArgSpec {
        command: "strength",
        action: "set_strength",
        key: "strength",
    },
    RawArgSpec {
        command: "prompt",
        action: "set_prompt",
        key: "text",
    },
    RawArgSpec {
        command: "negative",
        action: "set_negative_prompt",
        key: "text",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image1",
        action: "select_image1",
    },
    CommandSpec {
        command: "image2",
        action: "select_image2",
    },
    CommandSpec {
        command: "save",
        action: "save_result",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "show",
    action: "select_history",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "use",
        action: "use_result",
    },
    CommandSpec {
        command: "history",
        action: "list_history",
    },
    CommandSpec {
        command: "clear1",
        action: "clear_image1",
    },
    CommandSpec {
        command: "clear2",
        action: "clear_image2",
    },
    CommandSpec {
        command: "cancel",
        action: "cancel",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "styles",
        action: "list_styles",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/mode merge|edit",
    "/style <name>",
    "/styles",
    "/strength <1-100>",
    "/image1 <path>",
    "/image2 <path>",
    "/clear1",
    "/clear2",
    "/prompt <text>",
    "/negative <text>",
    "/generate",
    "/use",
    "/history",
    "/show <n>",
    "/save <path>",
    "/cancel",
    "/status",
    "/help",
    "/quit",
];
