use posbindu_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            request_timeout_secs,
            max_retries,
            code_prefix,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                api_base_url,
                request_timeout_secs,
                max_retries,
                patient_code_prefix: code_prefix,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

/// Values passed on the command line; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub patient_code_prefix: Option<String>,
}

impl ProfileUpdate {
    /// Merge into `existing`, validating the result before anything is saved.
    pub fn apply(self, existing: &CliProfile) -> Result<CliProfile, CliError> {
        let mut merged = existing.clone();
        if let Some(url) = normalize_text_option(self.api_base_url) {
            merged.api_base_url = Some(url);
        }
        if let Some(timeout) = self.request_timeout_secs {
            merged.request_timeout_secs = Some(timeout);
        }
        if let Some(max_retries) = self.max_retries {
            merged.max_retries = Some(max_retries);
        }
        if let Some(prefix) = normalize_text_option(self.patient_code_prefix) {
            merged.patient_code_prefix = Some(prefix);
        }

        merged.client_config().map_err(CliError::Config)?;
        Ok(merged)
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing_profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = update.apply(&existing_profile)?;
    *config.profile_mut_or_default(&profile_name) = merged;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let has_remote = config
        .profile(&profile_name)
        .is_some_and(|profile| profile.api_base_url.is_some());
    if has_remote {
        println!(
            "Run `posbindu auth login --profile {profile_name}` to store the bearer token for this remote."
        );
    } else {
        println!("Profile '{profile_name}' has no api_base_url; all writes will be queued locally.");
    }

    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let effective = config
        .profile(&profile_name)
        .cloned()
        .unwrap_or_default()
        .client_config()
        .map_err(CliError::Config)?;

    println!("# profile: {profile_name}");
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}
