//! Interactive nurse workstation over the triage session controller.
//!
//! All rendering is plain text; every action goes through controller
//! intents and read projections.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use client_core::{
    AdmissionForm, CaseFilter, CaseView, NoticeLevel, PatientApi, RestGateway, SessionController,
    SessionEvent, SessionPhase,
};
use shared::domain::{CaseId, CaseRecord, ChatRole, SoapNote, Urgency, UserRole};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the clinical backend; falls back to TRIAGE_SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let server_url = args
        .server_url
        .or_else(|| std::env::var("TRIAGE_SERVER_URL").ok())
        .unwrap_or_else(|| "http://localhost:8000/api/v1".to_string());

    let gateway = Arc::new(RestGateway::new(server_url));
    let controller = SessionController::new(gateway.clone(), gateway.clone(), gateway.clone());
    let mut events = controller.subscribe_events();

    let profile = controller.login(&args.username, &args.password).await?;
    println!("Signed in as {} ({:?})", profile.full_name, profile.role);

    if profile.role == UserRole::Doctor {
        println!("The doctor workspace is not available yet.");
        return Ok(());
    }

    let _ = controller.sync_cases().await;
    drain_events(&mut events);
    println!("{} patients in the active queue", controller.queue_len().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: admit, queue [search], history [search], show <id>, search <name>, treat <id>, remove <id>, export [path], sync, quit");

    loop {
        prompt("triage> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line.as_str(), ""),
        };

        match command {
            "" => {}
            "admit" => run_admission(&controller, &mut lines).await?,
            "queue" => print_cases(&list_view(&controller, CaseView::Active, rest).await, true),
            "history" => print_cases(&list_view(&controller, CaseView::History, rest).await, false),
            "show" => show_case(&controller, rest).await,
            "search" => search_patients(gateway.as_ref(), rest).await,
            "treat" => {
                if let Err(err) = controller.mark_treated(&CaseId(rest.to_string())).await {
                    println!("{err}");
                }
            }
            "remove" => {
                if let Err(err) = controller.mark_removed(&CaseId(rest.to_string())).await {
                    println!("{err}");
                }
            }
            "export" => export_csv(&controller, rest).await?,
            "sync" => {
                let _ = controller.sync_cases().await;
            }
            "quit" | "exit" => break,
            other => println!("Unknown command: {other}"),
        }

        drain_events(&mut events);
        if controller.profile().await.is_none() {
            println!("Signed out.");
            break;
        }
    }

    Ok(())
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Notice { level, message } => {
                let tag = match level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Warning => "warn",
                };
                println!("[{tag}] {message}");
            }
            SessionEvent::AuthExpired => {
                println!("Your session has expired; please sign in again.");
            }
            other => debug!(?other, "session event"),
        }
    }
}

async fn read_field(lines: &mut InputLines, label: &str) -> Result<String> {
    prompt(label);
    Ok(lines.next_line().await?.unwrap_or_default().trim().to_string())
}

async fn run_admission(controller: &SessionController, lines: &mut InputLines) -> Result<()> {
    controller.open_admission().await?;

    let form = AdmissionForm {
        first_name: read_field(lines, "First name: ").await?,
        last_name: read_field(lines, "Last name: ").await?,
        birth_year: read_field(lines, "Birth year: ").await?,
        birth_month: read_field(lines, "Birth month: ").await?,
        birth_day: read_field(lines, "Birth day: ").await?,
        gender: read_field(lines, "Gender: ").await?,
        complaint: read_field(lines, "Chief complaint: ").await?,
    };
    controller.set_form(form).await;

    if let Err(err) = controller.start_interview().await {
        println!("{err}");
        controller.cancel_admission().await?;
        return Ok(());
    }

    print_latest_assistant(controller).await;
    run_interview(controller, lines).await
}

async fn run_interview(controller: &SessionController, lines: &mut InputLines) -> Result<()> {
    println!("Interview started. Type replies, /end to finish, /cancel to abandon.");
    while controller.phase().await == SessionPhase::Interviewing {
        prompt("you> ");
        let Some(line) = lines.next_line().await? else {
            controller.cancel_interview().await?;
            return Ok(());
        };
        match line.trim() {
            "/cancel" => {
                controller.cancel_interview().await?;
                println!("Interview canceled.");
                return Ok(());
            }
            "/end" => {
                controller.finish_interview().await?;
            }
            text => {
                if let Err(err) = controller.send_chat_message(text).await {
                    println!("{err}");
                    continue;
                }
                print_latest_assistant(controller).await;
            }
        }
    }

    if controller.phase().await == SessionPhase::Reviewing {
        run_review(controller, lines).await?;
    }
    Ok(())
}

async fn run_review(controller: &SessionController, lines: &mut InputLines) -> Result<()> {
    println!("--- Review ---");
    print_note(&controller.draft_note().await.unwrap_or_else(SoapNote::empty));
    println!("Commands: show, subjective|objective|assessment|plan <text>, urgency <routine|urgent|immediate>, submit, discard");

    while controller.phase().await == SessionPhase::Reviewing {
        prompt("review> ");
        let Some(line) = lines.next_line().await? else {
            controller.discard_review().await?;
            return Ok(());
        };
        let line = line.trim().to_string();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line.as_str(), ""),
        };

        let mut note = controller.draft_note().await.unwrap_or_else(SoapNote::empty);
        match command {
            "show" => print_note(&note),
            "subjective" | "objective" | "assessment" | "plan" => {
                match command {
                    "subjective" => note.subjective = rest.to_string(),
                    "objective" => note.objective = rest.to_string(),
                    "assessment" => note.assessment = rest.to_string(),
                    _ => note.plan = rest.to_string(),
                }
                controller.set_draft_note(note).await?;
            }
            "urgency" => match parse_urgency(rest) {
                Some(urgency) => {
                    note.urgency = urgency;
                    controller.set_draft_note(note).await?;
                }
                None => println!("Expected routine, urgent, or immediate"),
            },
            "submit" => {
                let committed = controller.submit_review().await?;
                println!(
                    "Committed {} ({})",
                    committed.patient_name,
                    committed
                        .note
                        .as_ref()
                        .map(|note| note.urgency.label())
                        .unwrap_or("N/A")
                );
            }
            "discard" => {
                controller.discard_review().await?;
                println!("Draft discarded.");
            }
            "" => {}
            other => println!("Unknown command: {other}"),
        }
    }
    Ok(())
}

fn parse_urgency(raw: &str) -> Option<Urgency> {
    match raw.to_ascii_lowercase().as_str() {
        "routine" => Some(Urgency::Routine),
        "urgent" => Some(Urgency::Urgent),
        "immediate" => Some(Urgency::Immediate),
        _ => None,
    }
}

async fn print_latest_assistant(controller: &SessionController) {
    if let Some(message) = controller
        .transcript()
        .await
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::Assistant)
    {
        println!("assistant> {}", message.text);
    }
}

fn print_note(note: &SoapNote) {
    println!("Subjective: {}", note.subjective);
    println!("Objective:  {}", note.objective);
    println!("Assessment: {}", note.assessment);
    println!("Plan:       {}", note.plan);
    println!("Urgency:    {}", note.urgency.label());
}

async fn list_view(
    controller: &SessionController,
    view: CaseView,
    search: &str,
) -> Vec<CaseRecord> {
    if search.is_empty() {
        controller.cases_in_view(view).await
    } else {
        let filter = CaseFilter {
            search: Some(search.to_string()),
            ..CaseFilter::default()
        };
        controller.filtered_cases(view, &filter).await
    }
}

fn print_cases(cases: &[CaseRecord], with_wait: bool) {
    if cases.is_empty() {
        println!("(no cases)");
        return;
    }
    let now = Utc::now();
    for case in cases {
        let urgency = case
            .note
            .as_ref()
            .map(|note| note.urgency.label())
            .unwrap_or("N/A");
        if with_wait {
            println!(
                "{}  {:<24} {:>3}  {:<8} {:<10} {:?} waited {}m | {}",
                case.id,
                case.patient_name,
                case.age,
                case.gender,
                urgency,
                case.status,
                case.wait_minutes(now),
                case.chief_complaint,
            );
        } else {
            println!(
                "{}  {:<24} {:>3}  {:<8} {:<10} {:?} | {}",
                case.id, case.patient_name, case.age, case.gender, urgency, case.status,
                case.chief_complaint,
            );
        }
    }
}

async fn show_case(controller: &SessionController, raw_id: &str) {
    let id = CaseId(raw_id.to_string());
    let Some(case) = controller.case(&id).await else {
        println!("Unknown case: {raw_id}");
        return;
    };

    print_cases(std::slice::from_ref(&case), true);
    if let Some(note) = &case.note {
        print_note(note);
    }

    match controller.load_case_transcript(&id).await {
        Ok(transcript) if transcript.is_empty() => println!("(no transcript)"),
        Ok(transcript) => {
            for message in transcript {
                let speaker = match message.role {
                    ChatRole::Nurse => "nurse",
                    ChatRole::Assistant => "assistant",
                };
                println!("{speaker}> {}", message.text);
            }
        }
        Err(err) => println!("Could not load transcript: {err}"),
    }
}

async fn search_patients(gateway: &RestGateway, name: &str) {
    if name.is_empty() {
        println!("Usage: search <name>");
        return;
    }
    match gateway.search_patients(None, Some(name)).await {
        Ok(patients) if patients.is_empty() => println!("No matching patients."),
        Ok(patients) => {
            for patient in patients {
                println!(
                    "{}  {} {}  born {}  ({})",
                    patient.id,
                    patient.first_name,
                    patient.last_name,
                    patient.date_of_birth,
                    patient.national_id,
                );
            }
        }
        Err(err) => println!("Search failed: {err}"),
    }
}

async fn export_csv(controller: &SessionController, path: &str) -> Result<()> {
    let csv = controller.export_csv().await;
    let path = if path.is_empty() {
        format!("triage_log_{}.csv", Utc::now().format("%Y-%m-%d"))
    } else {
        path.to_string()
    };
    std::fs::write(&path, csv)?;
    println!("Exported to {path}");
    Ok(())
}
