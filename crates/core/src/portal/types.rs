//! Types shared by the portal collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::progress::TaskKey;

/// One of the cascading dropdowns on the search form, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropdownLevel {
    Year,
    District,
    Taluka,
    Village,
}

impl DropdownLevel {
    pub const ALL: [DropdownLevel; 4] = [
        DropdownLevel::Year,
        DropdownLevel::District,
        DropdownLevel::Taluka,
        DropdownLevel::Village,
    ];

    /// Number of enclosing selections this level's options depend on.
    pub fn depth(self) -> usize {
        match self {
            DropdownLevel::Year => 0,
            DropdownLevel::District => 1,
            DropdownLevel::Taluka => 2,
            DropdownLevel::Village => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DropdownLevel::Year => "year",
            DropdownLevel::District => "district",
            DropdownLevel::Taluka => "taluka",
            DropdownLevel::Village => "village",
        }
    }
}

impl fmt::Display for DropdownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The dropdown selections that lead to `task`, in form order.
pub fn dropdown_path(task: &TaskKey) -> [(DropdownLevel, &str); 4] {
    [
        (DropdownLevel::Year, task.year()),
        (DropdownLevel::District, task.district()),
        (DropdownLevel::Taluka, task.taluka()),
        (DropdownLevel::Village, task.village()),
    ]
}

/// A step of processing one task on the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    OpenSearchPage,
    Select(DropdownLevel),
    EnterDocNumber,
    SolveCaptcha,
    SubmitForm,
    DownloadResults,
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStep::OpenSearchPage => write!(f, "open search page"),
            ProcessStep::Select(level) => write!(f, "select {}", level),
            ProcessStep::EnterDocNumber => write!(f, "enter document number"),
            ProcessStep::SolveCaptcha => write!(f, "solve captcha"),
            ProcessStep::SubmitForm => write!(f, "submit form"),
            ProcessStep::DownloadResults => write!(f, "download results"),
        }
    }
}

/// Result of successfully processing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOutcome {
    /// Documents saved. Zero is a valid result: the search had no listings.
    pub documents: u32,
}
