#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub token_key: String,
    pub default_title: String,
    pub default_channel: String,
    pub load_error_message: String,
    pub load_issue_message: String,
    pub connection_lost_message: String,
    pub close_key: String,
    /// Suppress new connectivity issues while one is already held open.
    pub single_open_issue: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            token_key: "geotube_session_id".to_string(),
            default_title: "Unknown Video".to_string(),
            default_channel: "Unknown Channel".to_string(),
            load_error_message: "Failed to load video".to_string(),
            load_issue_message: "Video failed to load".to_string(),
            connection_lost_message: "Internet connection lost".to_string(),
            close_key: "Escape".to_string(),
            single_open_issue: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RestStoreConfig {
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }
}
