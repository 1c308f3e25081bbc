use posbindu_core::classify::Measurements;
use posbindu_core::Submission;

use crate::cli::ExamCommands;
use crate::commands::common::{
    format_examination_lines, parse_examined_at, parse_patient_code, submission_output,
    AppContext, GlobalArgs,
};
use crate::error::CliError;

pub async fn run_exam(command: ExamCommands, args: &GlobalArgs) -> Result<(), CliError> {
    match command {
        ExamCommands::Add {
            code,
            examined_at,
            height,
            weight,
            systolic,
            diastolic,
            fasting_glucose,
            random_glucose,
            two_hour_glucose,
            cholesterol,
            uric_acid,
            json,
        } => {
            let measurements = Measurements {
                height_cm: height,
                weight_kg: weight,
                systolic,
                diastolic,
                fasting_glucose,
                random_glucose,
                two_hour_glucose,
                cholesterol,
                uric_acid,
            };
            run_add_exam(&code, examined_at.as_deref(), measurements, json, args).await
        }
        ExamCommands::List { code, limit, json } => run_list_exams(&code, limit, json, args).await,
    }
}

pub async fn run_add_exam(
    code: &str,
    examined_at: Option<&str>,
    measurements: Measurements,
    as_json: bool,
    args: &GlobalArgs,
) -> Result<(), CliError> {
    if measurements.is_empty() {
        return Err(CliError::InvalidArgument(
            "Provide at least one measurement".to_string(),
        ));
    }
    let code = parse_patient_code(code)?;
    let examined_at = parse_examined_at(examined_at)?;

    let context = AppContext::open(args).await?;
    if context.store.get_patient(&code).await?.is_none() {
        return Err(CliError::PatientNotFound(code.to_string()));
    }

    let monitor = context.connectivity(args.offline).await;
    let submission = context
        .coordinator(monitor)
        .record_measurements(&code, examined_at, measurements)
        .await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&submission_output(&submission))?
        );
        return Ok(());
    }

    match &submission {
        Submission::Synced(_) => println!("Recorded examination for {code} (synced)"),
        Submission::Queued { queue_item_id, .. } => println!(
            "Recorded examination for {code} offline; queued as item #{queue_item_id}"
        ),
    }
    for line in format_examination_lines(std::slice::from_ref(submission.record())) {
        println!("  {line}");
    }
    Ok(())
}

pub async fn run_list_exams(
    code: &str,
    limit: usize,
    as_json: bool,
    args: &GlobalArgs,
) -> Result<(), CliError> {
    let code = parse_patient_code(code)?;
    let context = AppContext::open(args).await?;
    let examinations = context.store.list_examinations(&code, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&examinations)?);
        return Ok(());
    }

    if examinations.is_empty() {
        println!("No examinations recorded for {code}.");
        return Ok(());
    }

    for line in format_examination_lines(&examinations) {
        println!("{line}");
    }
    Ok(())
}
