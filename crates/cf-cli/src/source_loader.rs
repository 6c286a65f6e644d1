use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cf_api::DIALOG_FILE_SUFFIX;
use cf_core::FlowError;
use walkdir::WalkDir;

use crate::{CliStage, LoadedProject};

const PROJECT_REF_PREFIX: &str = "dialogs-dir:";

pub(crate) fn load_project_by_dialogs_dir(
    dialogs_dir: &str,
    entry_dialog: Option<String>,
) -> Result<LoadedProject, FlowError> {
    let dialogs_root = resolve_dialogs_dir(dialogs_dir)?;
    let dialogs_json = read_dialogs_json_from_dir(&dialogs_root)?;

    Ok(LoadedProject {
        id: make_dialogs_dir_project_id(&dialogs_root),
        dialogs_json,
        entry_dialog,
    })
}

/// Reloads the sources a saved state was produced from.
pub(crate) fn load_project_by_ref(
    project_ref: &str,
    entry_dialog: &str,
) -> Result<LoadedProject, FlowError> {
    let Some(raw) = project_ref.strip_prefix(PROJECT_REF_PREFIX) else {
        return Err(FlowError::new(
            "CLI_SOURCE_REF_INVALID",
            format!("Unsupported project ref: {}", project_ref),
        ));
    };
    load_project_by_dialogs_dir(raw, Some(entry_dialog.to_string()))
}

pub(crate) fn resolve_dialogs_dir(dialogs_dir: &str) -> Result<PathBuf, FlowError> {
    let path = PathBuf::from(dialogs_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(|error| CliStage::DialogsDir.fail(error))?
            .join(path)
    };

    if !absolute.exists() {
        return Err(FlowError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("dialogs-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(FlowError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("dialogs-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

pub(crate) fn read_dialogs_json_from_dir(
    dialogs_dir: &Path,
) -> Result<BTreeMap<String, String>, FlowError> {
    let mut dialogs = BTreeMap::new();

    for entry in WalkDir::new(dialogs_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path.to_string_lossy().ends_with(DIALOG_FILE_SUFFIX) {
            continue;
        }

        let relative = path
            .strip_prefix(dialogs_dir)
            .map_err(|error| CliStage::DialogScan.fail_at(path, error))?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(|error| CliStage::DialogRead.fail_at(path, error))?;
        dialogs.insert(relative, content);
    }

    if dialogs.is_empty() {
        return Err(FlowError::new(
            "CLI_SOURCE_EMPTY",
            format!(
                "No {} files under {}",
                DIALOG_FILE_SUFFIX,
                dialogs_dir.display()
            ),
        ));
    }

    Ok(dialogs)
}

pub(crate) fn make_dialogs_dir_project_id(dialogs_dir: &Path) -> String {
    format!("{}{}", PROJECT_REF_PREFIX, dialogs_dir.display())
}
