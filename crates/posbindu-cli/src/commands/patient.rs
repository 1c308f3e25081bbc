use posbindu_core::{PatientInput, Submission};
use serde::Serialize;

use crate::cli::PatientCommands;
use crate::commands::common::{
    format_examination_lines, format_patient_lines, parse_patient_code, submission_output,
    AppContext, GlobalArgs,
};
use crate::error::CliError;

const RECENT_EXAMINATIONS: usize = 5;

pub async fn run_patient(command: PatientCommands, args: &GlobalArgs) -> Result<(), CliError> {
    match command {
        PatientCommands::Add {
            nik,
            name,
            birth_date,
            gender,
            address,
            bpjs,
            json,
        } => {
            let input = PatientInput {
                nik,
                bpjs_number: bpjs,
                name,
                birth_date,
                gender: gender.into(),
                address,
            };
            run_add_patient(input, json, args).await
        }
        PatientCommands::List {
            limit,
            offset,
            json,
        } => run_list_patients(limit, offset, json, args).await,
        PatientCommands::Show { code, json } => run_show_patient(&code, json, args).await,
    }
}

pub async fn run_add_patient(
    input: PatientInput,
    as_json: bool,
    args: &GlobalArgs,
) -> Result<(), CliError> {
    let context = AppContext::open(args).await?;
    let monitor = context.connectivity(args.offline).await;
    let submission = context
        .coordinator(monitor)
        .register_patient(input)
        .await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&submission_output(&submission))?
        );
        return Ok(());
    }

    match &submission {
        Submission::Synced(patient) => println!("Registered {} (synced)", patient.code),
        Submission::Queued {
            record,
            queue_item_id,
        } => println!(
            "Registered {} offline; queued as item #{queue_item_id}",
            record.code
        ),
    }
    Ok(())
}

pub async fn run_list_patients(
    limit: usize,
    offset: usize,
    as_json: bool,
    args: &GlobalArgs,
) -> Result<(), CliError> {
    let context = AppContext::open(args).await?;
    let patients = context.store.list_patients(limit, offset).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&patients)?);
        return Ok(());
    }

    if patients.is_empty() {
        println!("No patients registered yet.");
        return Ok(());
    }

    for line in format_patient_lines(&patients) {
        println!("{line}");
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientDetail<'a> {
    patient: &'a posbindu_core::Patient,
    examinations: &'a [posbindu_core::Examination],
}

pub async fn run_show_patient(code: &str, as_json: bool, args: &GlobalArgs) -> Result<(), CliError> {
    let code = parse_patient_code(code)?;
    let context = AppContext::open(args).await?;
    let patient = context
        .store
        .get_patient(&code)
        .await?
        .ok_or_else(|| CliError::PatientNotFound(code.to_string()))?;
    let examinations = context
        .store
        .list_examinations(&code, RECENT_EXAMINATIONS)
        .await?;

    if as_json {
        let detail = PatientDetail {
            patient: &patient,
            examinations: &examinations,
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    for line in format_patient_lines(std::slice::from_ref(&patient)) {
        println!("{line}");
    }
    println!("NIK      {}", patient.nik);
    if let Some(bpjs) = &patient.bpjs_number {
        println!("BPJS     {bpjs}");
    }
    println!("Born     {}", patient.birth_date);
    println!("Address  {}", patient.address);

    if examinations.is_empty() {
        println!("No examinations recorded.");
    } else {
        println!("Recent examinations:");
        for line in format_examination_lines(&examinations) {
            println!("  {line}");
        }
    }
    Ok(())
}
