use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "task_description")]
    pub description: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(rename = "project_name", default)]
    pub project: String,
}

impl TaskRecord {
    /// Returns `None` when the description is blank; deadline and project are trimmed.
    pub fn new(description: &str, deadline: &str, project: &str) -> Option<Self> {
        let description = description.trim();
        if description.is_empty() {
            return None;
        }
        Some(Self {
            description: description.to_string(),
            deadline: deadline.trim().to_string(),
            project: project.trim().to_string(),
        })
    }
}

/// Every user's task list, keyed by the sender address exactly as the channel reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    users: BTreeMap<String, Vec<TaskRecord>>,
}

impl Document {
    pub fn tasks_for(&self, user: &str) -> &[TaskRecord] {
        self.users.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn replace_tasks(&mut self, user: &str, tasks: Vec<TaskRecord>) {
        if tasks.is_empty() {
            self.users.remove(user);
        } else {
            self.users.insert(user.to_string(), tasks);
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
