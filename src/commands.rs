use std::path::Path;
use std::sync::Arc;
use time::macros::format_description;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use printbox::client::{PrintService, ReportClient};
use printbox::config::Config;
use printbox::controller::{
    ControllerSettings, JobOutcome, PrintJobController, PrintRequest, StateChange,
};
use printbox::encoder::MapView;

use crate::cli::{JobArgs, RefArgs};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Events = UnboundedReceiver<StateChange>;

pub fn encode(config: &Config, args: JobArgs) -> Result<(), BoxError> {
    let (controller, _events) = controller(config, &args)?;
    let request = load_request(config, &args)?;

    let spec = controller.build_spec(&request)?;
    println!("{}", spec.to_json_pretty()?);

    Ok(())
}

pub async fn print(config: &Config, args: JobArgs) -> Result<(), BoxError> {
    let request = load_request(config, &args)?;
    let (controller, mut events) = controller(config, &args)?;
    let controller = Arc::new(controller);

    let reporter = tokio::spawn(async move {
        while let Some(change) = events.recv().await {
            eprintln!(
                "[{}] job {} {}",
                change
                    .at
                    .format(format_description!("[hour]:[minute]:[second].[subsecond digits:3]"))
                    .unwrap_or_default(),
                change.job,
                change.state.message()
            );
        }
    });

    let mut job = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_print(request).await })
    };

    let outcome = tokio::select! {
        result = &mut job => result??,
        _ = shutdown_signal() => {
            match controller.cancel_current_print().await {
                Ok(outcome) => info!(?outcome, "Print cancelled"),
                Err(e) => warn!(error = %e, "Nothing to cancel"),
            }
            job.await??
        }
    };

    info!(metrics = ?controller.metrics(), "Print finished");
    drop(controller);
    let _ = reporter.await;

    match outcome {
        JobOutcome::Ready(url) => {
            println!("{}", url);
            Ok(())
        }
        JobOutcome::Failed { code, message } => Err(format!("{}: {}", code, message).into()),
        JobOutcome::Cancelled => Err("print cancelled".into()),
        JobOutcome::TimedOut => Err("print timed out".into()),
        JobOutcome::Pending => Err("print ended without a result".into()),
    }
}

pub async fn status(config: &Config, args: RefArgs) -> Result<(), BoxError> {
    let client = ReportClient::new(&config.service.url, config.http_config())?;
    let reference = client.reference_for(&args.reference)?;

    let status = client.poll(&reference).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}

pub async fn cancel(config: &Config, args: RefArgs) -> Result<(), BoxError> {
    let client = ReportClient::new(&config.service.url, config.http_config())?;
    let reference = client.reference_for(&args.reference)?;

    let ack = client.cancel(&reference).await;
    if ack.accepted {
        println!("cancelled {}", reference.id);
        Ok(())
    } else {
        Err(format!(
            "print service did not accept cancellation of {} (status {})",
            reference.id,
            ack.status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
        .into())
    }
}

fn controller(config: &Config, args: &JobArgs) -> Result<(PrintJobController, Events), BoxError> {
    let client = ReportClient::new(&config.service.url, config.http_config())?
        .with_poll_interval(config.polling.interval.as_duration());

    let mut settings = ControllerSettings::from_config(config);
    if let Some(layout) = &args.layout {
        settings.layout = layout.clone();
    }
    if let Some(format) = &args.format {
        settings.format = format.clone();
    }

    let (controller, events) = PrintJobController::new(Arc::new(client), settings);
    let customizers = config.customizers();
    let controller = if customizers.is_empty() {
        controller
    } else {
        controller.with_customizer(customizers)
    };

    Ok((controller, events))
}

/// The view file fixes what is on the map; scale and dpi of the print come
/// from the command line or the configured defaults.
fn load_request(config: &Config, args: &JobArgs) -> Result<PrintRequest, BoxError> {
    let view = read_view(&args.view)?;

    Ok(PrintRequest::new(view, config.page.page_size())
        .with_scale(args.scale.unwrap_or(config.print.scale))
        .with_dpi(args.dpi.unwrap_or(config.print.dpi)))
}

fn read_view(path: &Path) -> Result<MapView, BoxError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read view file {}: {}", path.display(), e))?;
    let view = serde_json::from_str(&raw)
        .map_err(|e| format!("invalid view file {}: {}", path.display(), e))?;
    Ok(view)
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Cancellation requested");
}
