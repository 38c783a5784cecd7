use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use deepdetect_client::{
    app_state::AppState,
    config::AppConfig,
    models::{identity::Identity, job::Job},
    services::upload::MediaFile,
    views::{analysis::AnalysisView, history::HistoryView},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Command-line arguments
struct Args {
    /// User id to act as (defaults to DEEPDETECT_USER_ID)
    #[arg(long, global = true, value_name = "USER_ID")]
    user: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an image or video and wait for its analysis result
    Analyze {
        /// Path to the media file
        path: PathBuf,

        /// Return once the upload is accepted instead of waiting for the result
        #[arg(long)]
        no_wait: bool,
    },
    /// List previous analyses
    History,
    /// Download the original media of an analysis
    Download {
        /// Job id as shown by `history`
        job_id: String,

        /// Where to write the file (defaults to the original file name)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Delete an analysis and its media
    Delete {
        /// Job id as shown by `history`
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let state = AppState::new(&config)?;
    let identity = args
        .user
        .or_else(|| config.deepdetect_user_id.clone())
        .and_then(Identity::from_user_id);

    match args.command {
        Command::Analyze { path, no_wait } => analyze(&state, identity.as_ref(), path, no_wait).await,
        Command::History => {
            let identity = identity.ok_or("Sign in first: pass --user or set DEEPDETECT_USER_ID")?;
            let mut view = HistoryView::new();
            view.refresh(&state.backend, &identity).await?;
            print_history(&view);
            Ok(())
        }
        Command::Download { job_id, out } => {
            let identity = identity.ok_or("Sign in first: pass --user or set DEEPDETECT_USER_ID")?;
            let file = state.backend.download(&identity, &job_id).await?;
            let out = out
                .or_else(|| file.file_name.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(&job_id));
            tokio::fs::write(&out, &file.bytes).await?;
            println!("Saved {} ({} bytes)", out.display(), file.bytes.len());
            Ok(())
        }
        Command::Delete { job_id } => {
            let identity = identity.ok_or("Sign in first: pass --user or set DEEPDETECT_USER_ID")?;
            let message = state.backend.delete(&identity, &job_id).await?;
            println!("{message}");
            Ok(())
        }
    }
}

async fn analyze(
    state: &AppState,
    identity: Option<&Identity>,
    path: PathBuf,
    no_wait: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = MediaFile::open(&path).await?;

    // Subscribe before uploading so the first status event is not missed.
    let mut subscription = identity.map(|identity| state.push.subscribe(identity));

    let mut view = AnalysisView::new();
    view.begin(&file);

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
    let sink = Arc::new(move |percent: u8| {
        let _ = progress_tx.send(percent);
    });

    let upload = state.uploads.submit(&file, identity, sink);
    tokio::pin!(upload);
    let outcome = loop {
        tokio::select! {
            outcome = &mut upload => break outcome,
            Some(percent) = progress_rx.recv() => {
                view.record_progress(percent);
                eprint!("\rUploading... {percent}%");
            }
        }
    };
    while let Ok(percent) = progress_rx.try_recv() {
        view.record_progress(percent);
    }
    eprintln!();

    view.finish_upload(&outcome);
    if let Some(message) = view.message() {
        println!("{message}");
    }
    if view.is_error() {
        return Err("Upload failed".into());
    }
    if no_wait {
        return Ok(());
    }
    let (Some(identity), Some(subscription)) = (identity, subscription.as_mut()) else {
        return Ok(());
    };

    // Events that arrive meanwhile stay queued on the subscription.
    if !view.locate(&state.backend, identity).await? {
        return Err("The uploaded file did not appear in the analysis history".into());
    }

    eprintln!("Analyzing...");
    while !view.job().is_some_and(|job| job.status.is_terminal()) {
        tokio::select! {
            event = subscription.next() => match event {
                Some(event) => {
                    view.apply(&event);
                }
                None => return Err("Push channel closed before the analysis finished".into()),
            },
            _ = tokio::signal::ctrl_c() => {
                subscription.cancel();
                return Ok(());
            }
        }
    }

    if let Some(job) = view.job() {
        print_result(job);
    }
    subscription.cancel();
    Ok(())
}

fn print_result(job: &Job) {
    match (&job.prediction, &job.confidence) {
        (Some(prediction), confidence) => {
            println!("Prediction: {}", prediction.to_string().to_uppercase());
            if let Some(confidence) = confidence {
                println!("Confidence: {confidence}");
            }
            if let Some(completed_on) = &job.analysis_completed_on {
                println!("Analysis Completed At: {completed_on}");
            }
        }
        (None, _) => println!("Status: {}", job.status.to_string().to_uppercase()),
    }
}

fn print_history(view: &HistoryView) {
    if view.is_empty() {
        println!("No Uploads.");
        return;
    }

    println!(
        "{:<22} {:<28} {:<20} {:<10} {:<6} {:<10} {}",
        "ID", "FILE", "DATE", "STATUS", "RESULT", "CONFIDENCE", "COMPLETED"
    );
    for job in view.jobs().iter() {
        println!(
            "{:<22} {:<28} {:<20} {:<10} {:<6} {:<10} {}",
            job.id,
            format!("[{}] {}", job.file_type, job.file_name),
            job.uploaded_on.to_string(),
            job.status.to_string().to_uppercase(),
            job.prediction
                .map(|p| p.to_string().to_uppercase())
                .unwrap_or_else(|| "-".to_string()),
            job.confidence
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            job.analysis_completed_on
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}
