//! Dangerous-operation detection
//!
//! Shell commands are split into segments on `;`, `|`, `&`, `&&`, `||`
//! outside quotes, then each segment is tokenized and checked on its own.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::tools::path_utils::contains_traversal;
use crate::tools::ToolCall;

static FORK_BOMB_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:").ok());
static NETWORK_PIPE_TO_SHELL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(curl|wget)\b.*\|\s*(sh|bash|zsh)\b").ok());
static RAW_DISK_REDIRECT_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)>\s*/dev/(sd|nvme|vd|xvd|hd|disk)").ok());

fn is_match(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    (**pattern).as_ref().is_some_and(|re| re.is_match(text))
}

/// Why a tool call must not run, if it matches a known dangerous pattern
pub fn dangerous_call_reason(call: &ToolCall) -> Option<String> {
    match call.tool_name() {
        "remove-files" => {
            let paths = call.parameters().get("file_paths")?.as_array()?;
            paths
                .iter()
                .filter_map(Value::as_str)
                .find(|p| contains_traversal(p))
                .map(|p| format!("path traversal in delete target '{}'", p))
        }
        "launch-process" => dangerous_command_reason(call.param_str("command")?),
        _ => None,
    }
}

/// Why a shell command is dangerous, if it is
pub fn dangerous_command_reason(command: &str) -> Option<String> {
    // Whole-command patterns span segment separators
    if is_match(&FORK_BOMB_PATTERN, command) {
        return Some("fork bomb".into());
    }
    if is_match(&NETWORK_PIPE_TO_SHELL_PATTERN, command) {
        return Some("network script piped to shell".into());
    }

    if let Some(reason) = command_substitutions(command)
        .iter()
        .find_map(|inner| dangerous_command_reason(inner))
    {
        return Some(reason);
    }

    split_shell_segments(command)
        .iter()
        .find_map(|segment| dangerous_segment_reason(segment))
}

fn dangerous_segment_reason(segment: &str) -> Option<String> {
    if is_match(&RAW_DISK_REDIRECT_PATTERN, segment) {
        return Some("raw disk redirection".into());
    }
    dangerous_invocation_reason(&tokenize_shell(segment))
}

/// Commands that run their arguments as another command
const WRAPPERS: &[&str] = &[
    "builtin", "command", "env", "exec", "ionice", "nice", "nohup", "setsid", "stdbuf", "time",
    "timeout", "watch", "xargs",
];
const SHELLS: &[&str] = &["ash", "bash", "dash", "fish", "ksh", "sh", "zsh"];

/// Check one simple command. Wrappers, `sh -c` scripts, `eval` and
/// `find -exec` are followed into the command they run.
fn dangerous_invocation_reason(tokens: &[String]) -> Option<String> {
    let tokens = strip_env_prefix(tokens);
    let (first, args) = tokens.split_first()?;
    let command = command_name(first);
    if command.is_empty() {
        // Bare `(`, `{` or `!` before the real command
        return dangerous_invocation_reason(args);
    }

    let reason = match command.as_str() {
        c if WRAPPERS.contains(&c) => {
            // Option values and durations are tried as commands too; none of
            // them name a dangerous program
            return args
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.starts_with('-'))
                .find_map(|(i, _)| dangerous_invocation_reason(&args[i..]));
        }
        c if SHELLS.contains(&c) => {
            let script = args
                .iter()
                .position(|t| t.starts_with('-') && !t.starts_with("--") && t.contains('c'))
                .and_then(|i| args.get(i + 1))?;
            return dangerous_command_reason(script);
        }
        "eval" => return dangerous_command_reason(&args.join(" ")),
        "find" => {
            let exec = args
                .iter()
                .position(|t| matches!(t.as_str(), "-exec" | "-execdir" | "-ok" | "-okdir"))?;
            return dangerous_invocation_reason(&args[exec + 1..]);
        }
        "sudo" | "doas" | "su" => "privilege escalation",
        "rm" if is_recursive_force(args) => "recursive force delete",
        "chmod" if args.iter().any(|t| matches!(t.as_str(), "777" | "0777" | "-R777")) => {
            "unsafe chmod 777"
        }
        "dd" if args
            .iter()
            .any(|t| t.starts_with("of=/dev/") || t.starts_with("if=/dev/")) =>
        {
            "direct disk access with dd"
        }
        "shutdown" | "reboot" | "halt" | "poweroff" => "system power command",
        c if c.starts_with("mkfs") => "filesystem formatting command",
        _ => return None,
    };
    Some(reason.to_string())
}

/// Program name of a command token: subshell and grouping punctuation
/// stripped, directory dropped (`/bin/rm` is `rm`)
fn command_name(token: &str) -> String {
    let bare = token
        .trim_start_matches(['(', '$', '`', '{', '!'])
        .trim_end_matches([')', '`', ';']);
    Path::new(bare)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(bare)
        .to_ascii_lowercase()
}

/// Bodies of `$(...)` and backtick substitutions outside single quotes
fn command_substitutions(command: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut in_single = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if !in_single => {
                chars.next();
            }
            '\'' => in_single = !in_single,
            '$' if !in_single && chars.peek() == Some(&'(') => {
                chars.next();
                let mut depth = 1;
                let mut body = String::new();
                for inner in chars.by_ref() {
                    match inner {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    body.push(inner);
                }
                found.push(body);
            }
            '`' if !in_single => {
                let body: String = chars.by_ref().take_while(|c| *c != '`').collect();
                found.push(body);
            }
            _ => {}
        }
    }

    found
}

fn is_recursive_force(args: &[String]) -> bool {
    let flags: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|t| t.starts_with('-'))
        .collect();
    let short_has = |c: char| {
        flags
            .iter()
            .any(|f| !f.starts_with("--") && f.contains(c))
    };
    let recursive = short_has('r') || short_has('R') || flags.contains(&"--recursive");
    let force = short_has('f') || flags.contains(&"--force");
    recursive && force
}

fn split_shell_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    let flush = |current: &mut String, segments: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
        current.clear();
    };

    while let Some(ch) = chars.next() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_single => {
                current.push(ch);
                escaped = true;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            ';' | '\n' if !in_single && !in_double => flush(&mut current, &mut segments),
            '|' | '&' if !in_single && !in_double => {
                if chars.peek() == Some(&ch) {
                    chars.next();
                }
                flush(&mut current, &mut segments);
            }
            _ => current.push(ch),
        }
    }
    flush(&mut current, &mut segments);

    segments
}

fn tokenize_shell(segment: &str) -> Vec<String> {
    shell_words::split(segment)
        .unwrap_or_else(|_| segment.split_whitespace().map(ToString::to_string).collect())
}

fn strip_env_prefix(tokens: &[String]) -> &[String] {
    let is_assignment = |token: &String| {
        token.split_once('=').is_some_and(|(key, _)| {
            !key.is_empty() && key.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        })
    };
    let idx = tokens.iter().take_while(|t| is_assignment(t)).count();
    &tokens[idx..]
}
