use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "pingplan-server")]
pub struct Config {
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    #[arg(long, env = "PINGPLAN_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Optional override for the task document. Defaults to `${PINGPLAN_DATA_DIR}/tasks.json`.
    #[arg(long, env = "PINGPLAN_TASKS_FILE")]
    pub tasks_file: Option<PathBuf>,

    /// Keep tasks in memory only; nothing is written to disk.
    #[arg(long, env = "PINGPLAN_IN_MEMORY")]
    pub in_memory: bool,

    /// Without a key every free-text message gets the fallback reply.
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash")]
    pub gemini_model: String,

    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub gemini_base_url: String,

    /// Total timeout for one extraction request, in seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn effective_tasks_file(&self) -> PathBuf {
        self.tasks_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tasks.json"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn gemini_api_key(&self) -> Option<String> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_file_defaults_to_data_dir() {
        let config = Config::parse_from(["pingplan-server", "--data-dir", "/srv/pingplan"]);
        assert_eq!(
            config.effective_tasks_file(),
            PathBuf::from("/srv/pingplan/tasks.json")
        );
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = Config::parse_from(["pingplan-server", "--gemini-api-key", "   "]);
        assert_eq!(config.gemini_api_key(), None);
    }
}
