//! Reply text for each intent. Nothing here touches storage or the network.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::models::TaskRecord;

pub const NO_TASKS_REPLY: &str =
    "You don't have any tasks yet. Send me something like \"Submit the report by Friday\" to add one.";

pub const ACK_REPLY: &str = "You're welcome! Let me know whenever you have another task to track.";

pub const FALLBACK_REPLY: &str = "I couldn't find a task in that message.\n\
\n\
You can:\n\
- describe a task, e.g. \"Finish the CS101 assignment by Monday 9 PM\"\n\
- send \"show my tasks\" to see your list\n\
- send \"delete 2\" (or \"delete 1 3\") to remove tasks";

pub const EMPTY_MESSAGE_REPLY: &str =
    "I didn't catch that. Send me a task, or \"show my tasks\" to see your list.";

pub const TRY_AGAIN_REPLY: &str = "Sorry, something went wrong on my side. Please try again.";

const DELETE_FORMAT_HINT: &str =
    "Please tell me which task to delete, e.g. \"delete 2\" or \"delete 1 3\".";

pub fn list_reply(tasks: &[TaskRecord]) -> String {
    if tasks.is_empty() {
        return NO_TASKS_REPLY.to_string();
    }

    let mut out = String::from("Your tasks:\n");
    for (i, task) in tasks.iter().enumerate() {
        let _ = write!(out, "\n{}. {}", i + 1, task.description);
        if !task.deadline.is_empty() {
            let _ = write!(out, "\n   Deadline: {}", task.deadline);
        }
        if !task.project.is_empty() {
            let _ = write!(out, "\n   Project: {}", task.project);
        }
    }
    out
}

pub fn ack_reply() -> String {
    ACK_REPLY.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub tasks: Vec<TaskRecord>,
    pub reply: String,
    /// How many tasks were removed; the caller persists only when non-zero.
    pub removed: usize,
}

/// Deletes every valid 1-based index in `args` from `tasks`.
///
/// Invalid tokens (non-numeric, zero, past the end) are reported back while the valid ones are
/// still removed. Indices always refer to positions in `tasks` as given, whatever order they
/// were typed in.
pub fn delete_tasks(tasks: Vec<TaskRecord>, args: &str) -> DeleteOutcome {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.is_empty() {
        return unchanged(tasks, DELETE_FORMAT_HINT.to_string());
    }
    if tasks.is_empty() {
        return unchanged(tasks, "You have no tasks to delete.".to_string());
    }

    let len = tasks.len();
    let mut valid = BTreeSet::new();
    let mut invalid = Vec::new();
    for token in tokens {
        match token.parse::<usize>() {
            Ok(n) if (1..=len).contains(&n) => {
                valid.insert(n);
            }
            _ => invalid.push(token),
        }
    }

    if valid.is_empty() {
        let reply = format!(
            "Not a valid task number: {}. You have {} task{}, so use a number from 1 to {}, e.g. \"delete 1\".",
            invalid.join(", "),
            len,
            plural(len),
            len,
        );
        return unchanged(tasks, reply);
    }

    let mut tasks = tasks;
    let mut deleted = Vec::with_capacity(valid.len());
    for &n in valid.iter().rev() {
        deleted.push((n, tasks.remove(n - 1)));
    }
    deleted.reverse();

    let mut reply = format!("Deleted {} task{}:", deleted.len(), plural(deleted.len()));
    for (n, task) in &deleted {
        let _ = write!(reply, "\n{n}. {}", task.description);
    }
    if !invalid.is_empty() {
        let _ = write!(
            reply,
            "\n\nSkipped invalid task number{}: {}. Send \"show my tasks\" to see the current numbering.",
            plural(invalid.len()),
            invalid.join(", "),
        );
    }

    DeleteOutcome {
        tasks,
        reply,
        removed: deleted.len(),
    }
}

/// Appends `task` and returns the confirmation text.
pub fn add_task(tasks: &mut Vec<TaskRecord>, task: TaskRecord) -> String {
    let mut reply = format!("Task added: {}", task.description);
    if !task.deadline.is_empty() {
        let _ = write!(reply, "\nDeadline: {}", task.deadline);
    }
    if !task.project.is_empty() {
        let _ = write!(reply, "\nProject: {}", task.project);
    }
    tasks.push(task);
    let _ = write!(reply, "\n\nYou now have {} task{}.", tasks.len(), plural(tasks.len()));
    reply
}

pub fn fallback_reply() -> String {
    FALLBACK_REPLY.to_string()
}

fn unchanged(tasks: Vec<TaskRecord>, reply: String) -> DeleteOutcome {
    DeleteOutcome {
        tasks,
        reply,
        removed: 0,
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
