use std::sync::OnceLock;

use regex::Regex;

pub const CMD_RANDOM: &str = "/rnd";
pub const CMD_HELP: &str = "/help";
pub const CMD_START: &str = "/start";

pub const MSG_HELP: &str = "I can save and keep your pages. Also I can offer you them to read.

In order to save the page, just send me a link to it.

In order to get a random page from your list, send me command /rnd.
Caution! After that, this page will be removed from your list!";

/// Greeting prefix, followed by the help text.
pub const MSG_HELLO: &str = "Hi there!\n\n";

pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command. Send /help to see what I can do.";
pub const MSG_NO_SAVED_LINKS: &str = "You have no saved links.";
pub const MSG_LINK_SAVED: &str = "Link saved, id: ";
pub const MSG_LINK_EXISTS: &str = "This link already exists in the list.";

/// http or https, a host that does not start with a separator, and no whitespace anywhere.
fn url_pattern() -> &'static Regex {
    static URL_PATTERN: OnceLock<Regex> = OnceLock::new();
    URL_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^https?://[^\s/$.?#:@][^\s]*$").expect("url pattern is a valid regex")
    })
}

/// What an inbound message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddLink(String),
    Random,
    Help,
    Start,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if is_url(text) {
            return Command::AddLink(text.to_owned());
        }

        match text {
            CMD_RANDOM => Command::Random,
            CMD_HELP => Command::Help,
            CMD_START => Command::Start,
            _ => Command::Unknown,
        }
    }
}

pub fn is_url(text: &str) -> bool {
    url_pattern().is_match(text)
}
