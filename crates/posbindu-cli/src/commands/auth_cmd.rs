use std::io::{self, IsTerminal, Read};

use posbindu_core::util::normalize_text_option;

use crate::auth::TokenStore;
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    match command {
        AuthCommands::Login { profile, token } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let token = match normalize_text_option(token) {
                Some(token) => token,
                None => read_token_from_stdin()?,
            };
            TokenStore::new(&profile_name).save(&token)?;
            println!("Stored bearer token for profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            if TokenStore::new(&profile_name).load()?.is_some() {
                println!("Profile '{profile_name}' has a stored bearer token.");
            } else {
                println!("Profile '{profile_name}' has no stored bearer token.");
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            TokenStore::new(&profile_name).clear()?;
            println!("Removed bearer token for profile '{profile_name}'");
            Ok(())
        }
    }
}

fn read_token_from_stdin() -> Result<String, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::InvalidArgument(
            "Pass --token or pipe the token on stdin".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    normalize_text_option(Some(buffer))
        .ok_or_else(|| CliError::InvalidArgument("Token must not be empty".to_string()))
}
