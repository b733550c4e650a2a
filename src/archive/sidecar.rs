use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ManagerContext;
use crate::error::Result;

/// Filename prefix for sidecar files in the archive root
pub const SIDECAR_PREFIX: &str = "FailedResultsFolderInfo_";

/// Prefix prepended to a sidecar once its paired results directory has
/// been purged. The sidecar itself is kept as an audit trail.
pub const PURGE_MARKER: &str = "x_";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Provenance record stored beside an archived results directory.
///
/// Written once at archive time as tab-delimited `key<TAB>value` lines
/// in a fixed order (the Date line appears twice; downstream parsers
/// expect it in both positions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedResultsSidecar {
    pub date: DateTime<Utc>,
    pub results_folder_name: String,
    pub manager: String,
    pub job_tool_description: String,
    pub job: String,
    pub step: String,
    pub tool: String,
    pub step_tool: String,
    pub dataset: String,
    pub xfer_folder: String,
    pub param_file_name: String,
    pub settings_file_name: String,
    pub legacy_organism_db_name: String,
    pub protein_collection_list: String,
    pub protein_options_list: String,
    pub fasta_file_name: String,
}

impl FailedResultsSidecar {
    /// Build a sidecar from the manager/job parameters
    pub fn from_context(ctx: &ManagerContext, results_folder_name: impl Into<String>) -> Self {
        let param = |key: &str| ctx.get_param(key).unwrap_or_default().to_string();
        Self {
            date: Utc::now(),
            results_folder_name: results_folder_name.into(),
            manager: ctx.manager_name.clone(),
            job_tool_description: ctx.current_job_tool_description().to_string(),
            job: param("Job"),
            step: param("Step"),
            tool: param("Tool"),
            step_tool: param("StepTool"),
            dataset: param("Dataset"),
            xfer_folder: param("TransferDirectoryPath"),
            param_file_name: param("ParamFileName"),
            settings_file_name: param("SettingsFileName"),
            legacy_organism_db_name: param("LegacyOrganismDBName"),
            protein_collection_list: param("ProteinCollectionList"),
            protein_options_list: param("ProteinOptionsList"),
            fasta_file_name: param("FastaFileName"),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.txt", SIDECAR_PREFIX, self.results_folder_name)
    }

    /// Serialize to the tab-delimited wire format
    pub fn to_tab_delimited(&self) -> String {
        let date = self.date.format(DATE_FORMAT).to_string();
        let lines = [
            ("Date", date.as_str()),
            ("ResultsFolderName", self.results_folder_name.as_str()),
            ("Manager", self.manager.as_str()),
            ("JobToolDescription", self.job_tool_description.as_str()),
            ("Job", self.job.as_str()),
            ("Step", self.step.as_str()),
            ("Date", date.as_str()),
            ("Tool", self.tool.as_str()),
            ("StepTool", self.step_tool.as_str()),
            ("Dataset", self.dataset.as_str()),
            ("XferFolder", self.xfer_folder.as_str()),
            ("ParamFileName", self.param_file_name.as_str()),
            ("SettingsFileName", self.settings_file_name.as_str()),
            ("LegacyOrganismDBName", self.legacy_organism_db_name.as_str()),
            ("ProteinCollectionList", self.protein_collection_list.as_str()),
            ("ProteinOptionsList", self.protein_options_list.as_str()),
            ("FastaFileName", self.fasta_file_name.as_str()),
        ];
        let mut text = String::new();
        for (key, value) in lines {
            text.push_str(key);
            text.push('\t');
            text.push_str(value);
            text.push('\n');
        }
        text
    }

    /// Write the sidecar into `dir`, returning the path written
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, self.to_tab_delimited()).await?;
        Ok(path)
    }
}

/// True for a sidecar that has not yet been marked purged
pub fn is_active_sidecar(file_name: &str) -> bool {
    file_name.starts_with(SIDECAR_PREFIX) && file_name.ends_with(".txt")
}

/// Results folder paired with a sidecar file name
pub fn results_folder_for(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(SIDECAR_PREFIX)
        .and_then(|rest| rest.strip_suffix(".txt"))
        .filter(|name| !name.is_empty())
}

/// Sidecar name after its paired directory has been purged
pub fn purged_name(file_name: &str) -> String {
    format!("{}{}", PURGE_MARKER, file_name)
}
