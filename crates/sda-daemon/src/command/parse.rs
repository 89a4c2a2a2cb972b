/// Chat mention that routes a message to the GitHub dispatcher.
pub const TRIGGER: &str = "@github";

/// Strip every `@github` mention from `message`.
///
/// Returns the trimmed remainder when the message mentioned the trigger
/// (matched case-insensitively), `None` otherwise.
pub fn extract_trigger(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    if !lower.contains(TRIGGER) {
        return None;
    }

    let mut stripped = String::with_capacity(message.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(TRIGGER) {
        stripped.push_str(&message[rest..start]);
        rest = start + TRIGGER.len();
    }
    stripped.push_str(&message[rest..]);
    Some(stripped.trim().to_string())
}

/// First non-empty `"..."` phrase in `input` and the text after its
/// closing quote.
fn quoted(input: &str) -> Option<(&str, &str)> {
    let mut rest = input;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        let close = after.find('"')?;
        if close > 0 {
            return Some((&after[..close], &after[close + 1..]));
        }
        // `""`: the closing quote may open the next phrase.
        rest = after;
    }
    None
}

/// A parsed chat command.
///
/// Keywords are matched case-insensitively; arguments keep their case.
/// Required arguments are left optional here so the dispatcher can answer
/// with a usage hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Push { message: Option<String> },
    Pull,
    Status,
    ListRepositories,
    ListBranches,
    CreateBranch { name: Option<String>, from: Option<String> },
    ListCommits,
    ListPullRequests,
    CreatePullRequest {
        title: Option<String>,
        head: Option<String>,
        base: Option<String>,
    },
    ListIssues,
    CreateIssue { title: Option<String> },
    Help,
    /// The unrecognized command phrase, e.g. `frobnicate` or `list widgets`.
    Unknown(String),
}

impl Request {
    pub fn parse(input: &str) -> Self {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Request::Help;
        };
        let action = first.to_lowercase();
        let subject = tokens.get(1).map(|t| t.to_lowercase());

        match action.as_str() {
            "help" => Request::Help,
            "push" => Request::Push {
                message: join(&tokens[1..]),
            },
            "pull" => Request::Pull,
            "status" | "info" => Request::Status,
            "repos" | "repositories" => Request::ListRepositories,
            "branches" => Request::ListBranches,
            "commits" => Request::ListCommits,
            "prs" | "pulls" => Request::ListPullRequests,
            "issues" => Request::ListIssues,
            "list" => match subject.as_deref() {
                Some("repos") | Some("repositories") => Request::ListRepositories,
                Some("branches") => Request::ListBranches,
                Some("commits") => Request::ListCommits,
                Some("prs") | Some("pulls") => Request::ListPullRequests,
                Some("issues") => Request::ListIssues,
                _ => Request::Unknown(phrase(&action, subject)),
            },
            "create" => match subject.as_deref() {
                Some("branch") => create_branch(&tokens[2..]),
                Some("issue") => Request::CreateIssue {
                    title: title(input, &tokens[2..]),
                },
                Some("pr") | Some("pull") => create_pull_request(input, &tokens[2..]),
                _ => Request::Unknown(phrase(&action, subject)),
            },
            _ => Request::Unknown(first.to_string()),
        }
    }
}

fn phrase(action: &str, subject: Option<String>) -> String {
    match subject {
        Some(subject) => format!("{action} {subject}"),
        None => action.to_string(),
    }
}

fn join(tokens: &[&str]) -> Option<String> {
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

/// First quoted phrase anywhere in the command, else every remaining word.
fn title(input: &str, args: &[&str]) -> Option<String> {
    quoted(input)
        .map(|(title, _)| title.trim())
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .or_else(|| join(args))
}

/// Word following `keyword`, compared case-insensitively.
fn after_keyword(tokens: &[&str], keyword: &str) -> Option<String> {
    tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case(keyword))
        .and_then(|i| tokens.get(i + 1))
        .map(|t| t.to_string())
}

/// `create branch <name> [from <base>]`
fn create_branch(args: &[&str]) -> Request {
    let name = args
        .first()
        .filter(|t| !t.eq_ignore_ascii_case("from"))
        .map(|t| t.to_string());
    Request::CreateBranch {
        name,
        from: after_keyword(args, "from"),
    }
}

/// `create pr "<title>" <head> [into <base>]`
///
/// Without a quoted title the arguments are read as `<head> [into <base>]`.
fn create_pull_request(input: &str, args: &[&str]) -> Request {
    let (title, rest) = match quoted(input) {
        Some((title, after)) if !title.trim().is_empty() => (
            Some(title.trim().to_string()),
            after.split_whitespace().collect::<Vec<_>>(),
        ),
        _ => (None, args.to_vec()),
    };
    let head = rest
        .iter()
        .find(|t| !t.eq_ignore_ascii_case("into"))
        .map(|t| t.to_string());
    Request::CreatePullRequest {
        title,
        head,
        base: after_keyword(&rest, "into"),
    }
}
