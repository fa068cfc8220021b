pub mod poll;

use crate::models::RoomVisibility;
use crate::polls::PollDraft;

const DEFAULT_HISTORY: u32 = 20;
const MAX_HISTORY: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { name: String },
    Rooms,
    Create { visibility: RoomVisibility, name: String, password: Option<String> },
    Join { room_id: String, password: Option<String> },
    Leave,
    Invite { user_id: String },
    Terminate,
    Who,
    History { limit: u32 },
    Poll(PollDraft),
    Polls,
    Vote { poll_id: String, option_indices: Vec<i32> },
    Results { poll_id: String },
    End { poll_id: String },
    Draft { text: String },
    Help,
    Quit,
}

pub fn help_text() -> String {
    [
        "/login <name>                         start a session",
        "/rooms                                list rooms",
        "/create <public|private|password> <name> [password]",
        "/join <room_id> [password]            enter a room",
        "/leave                                give up membership",
        "/invite <user_id>                     owner: invite to a private room",
        "/terminate                            owner: delete the room",
        "/who                                  who is online here",
        "/history [n]                          recent messages",
        poll::usage(),
        "/polls                                open polls here",
        "/vote <poll_id> <n>[,<n>...]          vote (options start at 1)",
        "/results <poll_id>                    current tally",
        "/end <poll_id>                        close a poll",
        "/draft <text>                         preview message type",
        "/quit                                 disconnect",
    ]
    .join("\n")
}

/// Parses a line starting with `/`. Returns `None` for chat text.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    let body = line.strip_prefix('/')?;
    let (name, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let args = args.trim();

    let parsed = match name.to_ascii_lowercase().as_str() {
        "login" => single_word(args, "usage: /login <name>").map(|name| Command::Login { name }),
        "rooms" => Ok(Command::Rooms),
        "create" => parse_create(args),
        "join" => {
            let mut words = args.split_whitespace();
            match words.next() {
                Some(room_id) => Ok(Command::Join {
                    room_id: room_id.to_string(),
                    password: words.next().map(str::to_string),
                }),
                None => Err("usage: /join <room_id> [password]".to_string()),
            }
        }
        "leave" => Ok(Command::Leave),
        "invite" => single_word(args, "usage: /invite <user_id>").map(|user_id| Command::Invite { user_id }),
        "terminate" => Ok(Command::Terminate),
        "who" => Ok(Command::Who),
        "history" => parse_history(args),
        "poll" => poll::parse_poll_command(args).map(Command::Poll),
        "polls" => Ok(Command::Polls),
        "vote" => poll::parse_vote_command(args).map(|(poll_id, option_indices)| Command::Vote {
            poll_id,
            option_indices,
        }),
        "results" => single_word(args, "usage: /results <poll_id>").map(|poll_id| Command::Results { poll_id }),
        "end" => single_word(args, "usage: /end <poll_id>").map(|poll_id| Command::End { poll_id }),
        "draft" => Ok(Command::Draft { text: args.to_string() }),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{other}, try /help")),
    };

    Some(parsed)
}

fn single_word(args: &str, usage: &str) -> Result<String, String> {
    let mut words = args.split_whitespace();
    match (words.next(), words.next()) {
        (Some(word), None) => Ok(word.to_string()),
        _ => Err(usage.to_string()),
    }
}

fn parse_create(args: &str) -> Result<Command, String> {
    const USAGE: &str = "usage: /create <public|private|password> <name> [password]";
    let mut words = args.split_whitespace();
    let visibility = words
        .next()
        .and_then(RoomVisibility::parse)
        .ok_or_else(|| USAGE.to_string())?;
    let name = words.next().ok_or_else(|| USAGE.to_string())?.to_string();
    let password = words.next().map(str::to_string);
    if words.next().is_some() {
        return Err(USAGE.to_string());
    }

    Ok(Command::Create { visibility, name, password })
}

fn parse_history(args: &str) -> Result<Command, String> {
    if args.is_empty() {
        return Ok(Command::History { limit: DEFAULT_HISTORY });
    }
    let limit: u32 = args
        .parse()
        .map_err(|_| "usage: /history [n]".to_string())?;
    Ok(Command::History {
        limit: limit.clamp(1, MAX_HISTORY),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_text_is_not_a_command() {
        assert!(parse("hello").is_none());
        assert!(parse("  hi /there").is_none());
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("/rooms"), Some(Ok(Command::Rooms)));
        assert_eq!(parse("/WHO"), Some(Ok(Command::Who)));
        assert_eq!(parse("/exit"), Some(Ok(Command::Quit)));
        assert_eq!(parse("/login ada"), Some(Ok(Command::Login { name: "ada".to_string() })));
        assert!(matches!(parse("/login two words"), Some(Err(_))));
        assert!(matches!(parse("/dance"), Some(Err(_))));
    }

    #[test]
    fn create_and_join() {
        assert_eq!(
            parse("/create password vault s3cret"),
            Some(Ok(Command::Create {
                visibility: RoomVisibility::Password,
                name: "vault".to_string(),
                password: Some("s3cret".to_string()),
            }))
        );
        assert!(matches!(parse("/create secret vault"), Some(Err(_))));
        assert_eq!(
            parse("/join abc"),
            Some(Ok(Command::Join { room_id: "abc".to_string(), password: None }))
        );
    }

    #[test]
    fn history_limits() {
        assert_eq!(parse("/history"), Some(Ok(Command::History { limit: 20 })));
        assert_eq!(parse("/history 500"), Some(Ok(Command::History { limit: 100 })));
        assert_eq!(parse("/history 0"), Some(Ok(Command::History { limit: 1 })));
        assert!(matches!(parse("/history lots"), Some(Err(_))));
    }

    #[test]
    fn poll_and_vote() {
        match parse("/poll --multi Q | a | b") {
            Some(Ok(Command::Poll(draft))) => {
                assert!(draft.multi_select);
                assert_eq!(draft.options.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse("/vote p1 1,2"),
            Some(Ok(Command::Vote { poll_id: "p1".to_string(), option_indices: vec![0, 1] }))
        );
    }
}
