use std::path::Path;

use serde::Deserialize;

use crate::config::{ConfigError, Presence, load_toml, load_toml_or_default};
use crate::protocol::Role;

const USER_TASK_DESCRIPTION: &str = "\
# Live Chat

You recently started a **new job in Sydney** and need to find an apartment to live in. \
For now, you stay in a hotel, but that is expensive, so you'll **want to find something soon**. \
A friend of yours recommended the virtual assistant that you are about to talk to now. \
Maybe it can help you find something you like?";

const WIZARD_TASK_DESCRIPTION: &str = "\
# Live Chat

You play the role of a **virtual assistant** that helps people find an apartment in Sydney. \
The user that you talk to may sometimes change their mind and may not be sure what they want. \
Your task is to be as helpful to the user as possible in any case, but \
**you cannot do anything but searching and discussing apartments**. \
So if the user wants you to make coffee, you should explain that you cannot do this. \
If you feel like you should provide the user with an example apartment, **just make up a description**.

Users may even be rude or uncooperative, but you are beyond this and **always keep a patient, level tone**.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleInstructions {
    pub task_description: String,
    pub completion_requirements: Vec<String>,
    pub completion_questions: Vec<String>,
    pub accept_prompt: String,
}

impl RoleInstructions {
    fn user() -> Self {
        Self {
            task_description: USER_TASK_DESCRIPTION.to_string(),
            completion_requirements: vec![
                "You found an apartment that satisfies at least 4 specific criteria of your choosing \
                 (e.g. number of rooms, balcony/elevator availability, etc.) - you might have to make \
                 some compromises to find something"
                    .to_string(),
                "You have changed your mind about what you want at least once during the conversation"
                    .to_string(),
                "You said goodbye (or similar) at the end of your dialogue".to_string(),
            ],
            completion_questions: vec![
                "Did the assistant fulfil their task?".to_string(),
            ],
            accept_prompt: default_accept_prompt(),
        }
    }

    fn wizard() -> Self {
        Self {
            task_description: WIZARD_TASK_DESCRIPTION.to_string(),
            completion_requirements: vec![
                "The user has found a suitable apartment".to_string(),
                "The user has said 'goodbye' (or similar)".to_string(),
            ],
            completion_questions: vec!["Did the user fulfil their task?".to_string()],
            accept_prompt: default_accept_prompt(),
        }
    }
}

impl Default for RoleInstructions {
    fn default() -> Self {
        Self {
            task_description: String::new(),
            completion_requirements: Vec::new(),
            completion_questions: Vec::new(),
            accept_prompt: default_accept_prompt(),
        }
    }
}

fn default_accept_prompt() -> String {
    "If you are ready, please click \"Accept HIT\" to start this task.".to_string()
}

/// Per-role task instructions shown in the left pane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub user: RoleInstructions,
    pub wizard: RoleInstructions,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            user: RoleInstructions::user(),
            wizard: RoleInstructions::wizard(),
        }
    }
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    /// A scenario path is always given explicitly, so a missing file is warned about.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        load_toml_or_default(path, "scenario", Presence::Expected)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn for_role(&self, role: Role) -> &RoleInstructions {
        match role {
            Role::User => &self.user,
            Role::Wizard => &self.wizard,
        }
    }

    pub fn for_role_mut(&mut self, role: Role) -> &mut RoleInstructions {
        match role {
            Role::User => &mut self.user,
            Role::Wizard => &mut self.wizard,
        }
    }
}
