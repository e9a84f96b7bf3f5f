//! Prompt templates for Podsift.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub analysis: AnalysisPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for finding future-episode suggestions in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AnalysisPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are analyzing transcripts from the podcast {{podcast}}.

Your task is to identify ALL instances where the hosts suggest they should do a future episode on a specific topic. This includes any phrasing like:
- "we should do an episode on X"
- "that would make a great episode"
- "we need to cover X"
- "remind me to talk about X"
- "X deserves its own episode"
- Any other variation where they propose a future episode topic

Never invent suggestions that are not in the transcript."#
                .to_string(),

            user: r#"Episode: {{title}}

Each transcript line starts with its [MM:SS] or [HH:MM:SS] timestamp.

Transcript:
{{transcript}}

For EACH instance you find, provide:
- "timestamp_seconds": the start of the suggestion in seconds, from the line timestamps
- "topic": a brief summary of the topic they want to cover
- "quote": the exact words they said

Respond with a JSON array only. Example:
[
  {"timestamp_seconds": 754, "topic": "The replication crisis in psychology", "quote": "we should really do a whole episode on replication"}
]

If you find no instances, return an empty array: []"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let analysis_path = custom_path.join("analysis.toml");
            if analysis_path.exists() {
                let content = std::fs::read_to_string(&analysis_path)?;
                prompts.analysis = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
