use crate::polls::PollDraft;

// /poll [--multi] [--minutes N] <question> | <option> | <option>...
pub fn parse_poll_command(args: &str) -> Result<PollDraft, String> {
    let mut rest = args.trim();
    let mut multi_select = false;
    let mut duration_minutes = None;

    loop {
        if let Some(after) = rest.strip_prefix("--multi") {
            if !after.is_empty() && !after.starts_with(char::is_whitespace) {
                return Err(format!("unknown flag in: {rest}"));
            }
            multi_select = true;
            rest = after.trim_start();
        } else if let Some(after) = rest.strip_prefix("--minutes") {
            let after = after.trim_start();
            let (value, tail) = after.split_once(char::is_whitespace).unwrap_or((after, ""));
            let minutes = value
                .parse::<i64>()
                .map_err(|_| format!("--minutes needs a number, got {value:?}"))?;
            duration_minutes = Some(minutes);
            rest = tail.trim_start();
        } else if rest.starts_with("--") {
            let flag = rest.split_whitespace().next().unwrap_or(rest);
            return Err(format!("unknown flag {flag}"));
        } else {
            break;
        }
    }

    let mut parts = rest.split('|').map(str::trim);
    let question = parts.next().unwrap_or_default().to_string();
    let options: Vec<String> = parts.map(str::to_string).collect();

    if question.is_empty() || options.is_empty() {
        return Err(usage().to_string());
    }

    Ok(PollDraft {
        question,
        options,
        multi_select,
        duration_minutes,
    })
}

// /vote <poll_id> <n>[,<n>...]; options are numbered from 1 in chat
pub fn parse_vote_command(args: &str) -> Result<(String, Vec<i32>), String> {
    let mut words = args.split_whitespace();
    let poll_id = words.next().ok_or("usage: /vote <poll_id> <option>[,<option>...]")?;
    let choices: String = words.collect::<Vec<_>>().join("");
    if choices.is_empty() {
        return Err("pick at least one option number".to_string());
    }

    let indices = choices
        .split(',')
        .filter(|c| !c.is_empty())
        .map(|c| {
            c.parse::<i32>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| format!("{c:?} is not an option number"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((poll_id.to_string(), indices))
}

pub fn usage() -> &'static str {
    "usage: /poll [--multi] [--minutes N] <question> | <option> | <option>..."
}
