//! Document taxonomy: the fixed document type → category mapping.
//!
//! Every canonical path is `docs/<category>/<document_type>/<filename>`, and
//! the category segment is never chosen freely: it is always the category
//! that the document type belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight top-level documentation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Planning,
    Architecture,
    Guides,
    Reference,
    Processes,
    Governance,
    Operations,
    Communication,
}

impl Category {
    pub const ALL: [Self; 8] = [
        Self::Planning,
        Self::Architecture,
        Self::Guides,
        Self::Reference,
        Self::Processes,
        Self::Governance,
        Self::Operations,
        Self::Communication,
    ];

    /// Get the string representation for storage and paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Architecture => "architecture",
            Self::Guides => "guides",
            Self::Reference => "reference",
            Self::Processes => "processes",
            Self::Governance => "governance",
            Self::Operations => "operations",
            Self::Communication => "communication",
        }
    }

    /// Parse from the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == lower)
    }

    /// Document types that live under this category.
    #[must_use]
    pub fn document_types(self) -> Vec<DocumentType> {
        DocumentType::ALL
            .into_iter()
            .filter(|t| t.category() == self)
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document types tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    // Planning
    Requirements,
    UserStory,
    UseCase,
    ProjectPlan,
    Roadmap,
    IdeaBrief,
    // Architecture
    ArchitectureDoc,
    DesignDoc,
    Adr,
    TechnicalSpec,
    // Guides
    UserGuide,
    DeveloperGuide,
    Tutorial,
    Troubleshooting,
    // Reference
    ApiDoc,
    Specification,
    Glossary,
    ReferenceDoc,
    // Processes
    TestPlan,
    MigrationGuide,
    Workflow,
    ProcessDoc,
    // Governance
    Policy,
    Standard,
    QualityGate,
    Compliance,
    // Operations
    Runbook,
    DeploymentGuide,
    Monitoring,
    IncidentReport,
    // Communication
    MeetingNotes,
    StatusReport,
    ReleaseNotes,
    Announcement,
}

impl DocumentType {
    pub const ALL: [Self; 34] = [
        Self::Requirements,
        Self::UserStory,
        Self::UseCase,
        Self::ProjectPlan,
        Self::Roadmap,
        Self::IdeaBrief,
        Self::ArchitectureDoc,
        Self::DesignDoc,
        Self::Adr,
        Self::TechnicalSpec,
        Self::UserGuide,
        Self::DeveloperGuide,
        Self::Tutorial,
        Self::Troubleshooting,
        Self::ApiDoc,
        Self::Specification,
        Self::Glossary,
        Self::ReferenceDoc,
        Self::TestPlan,
        Self::MigrationGuide,
        Self::Workflow,
        Self::ProcessDoc,
        Self::Policy,
        Self::Standard,
        Self::QualityGate,
        Self::Compliance,
        Self::Runbook,
        Self::DeploymentGuide,
        Self::Monitoring,
        Self::IncidentReport,
        Self::MeetingNotes,
        Self::StatusReport,
        Self::ReleaseNotes,
        Self::Announcement,
    ];

    /// Get the string representation for storage and paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::UserStory => "user_story",
            Self::UseCase => "use_case",
            Self::ProjectPlan => "project_plan",
            Self::Roadmap => "roadmap",
            Self::IdeaBrief => "idea_brief",
            Self::ArchitectureDoc => "architecture_doc",
            Self::DesignDoc => "design_doc",
            Self::Adr => "adr",
            Self::TechnicalSpec => "technical_spec",
            Self::UserGuide => "user_guide",
            Self::DeveloperGuide => "developer_guide",
            Self::Tutorial => "tutorial",
            Self::Troubleshooting => "troubleshooting",
            Self::ApiDoc => "api_doc",
            Self::Specification => "specification",
            Self::Glossary => "glossary",
            Self::ReferenceDoc => "reference_doc",
            Self::TestPlan => "test_plan",
            Self::MigrationGuide => "migration_guide",
            Self::Workflow => "workflow",
            Self::ProcessDoc => "process_doc",
            Self::Policy => "policy",
            Self::Standard => "standard",
            Self::QualityGate => "quality_gate",
            Self::Compliance => "compliance",
            Self::Runbook => "runbook",
            Self::DeploymentGuide => "deployment_guide",
            Self::Monitoring => "monitoring",
            Self::IncidentReport => "incident_report",
            Self::MeetingNotes => "meeting_notes",
            Self::StatusReport => "status_report",
            Self::ReleaseNotes => "release_notes",
            Self::Announcement => "announcement",
        }
    }

    /// The category this document type is filed under.
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Requirements
            | Self::UserStory
            | Self::UseCase
            | Self::ProjectPlan
            | Self::Roadmap
            | Self::IdeaBrief => Category::Planning,
            Self::ArchitectureDoc | Self::DesignDoc | Self::Adr | Self::TechnicalSpec => {
                Category::Architecture
            }
            Self::UserGuide | Self::DeveloperGuide | Self::Tutorial | Self::Troubleshooting => {
                Category::Guides
            }
            Self::ApiDoc | Self::Specification | Self::Glossary | Self::ReferenceDoc => {
                Category::Reference
            }
            Self::TestPlan | Self::MigrationGuide | Self::Workflow | Self::ProcessDoc => {
                Category::Processes
            }
            Self::Policy | Self::Standard | Self::QualityGate | Self::Compliance => {
                Category::Governance
            }
            Self::Runbook | Self::DeploymentGuide | Self::Monitoring | Self::IncidentReport => {
                Category::Operations
            }
            Self::MeetingNotes | Self::StatusReport | Self::ReleaseNotes | Self::Announcement => {
                Category::Communication
            }
        }
    }

    /// Parse from the exact storage representation.
    ///
    /// Use [`crate::validate::normalize_document_type`] for user input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
