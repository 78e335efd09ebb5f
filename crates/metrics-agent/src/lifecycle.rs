use tokio::signal::unix::{signal, SignalKind};

/// Resolves once SIGINT, SIGTERM or SIGQUIT is received.
pub(crate) async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigquit.recv() => tracing::info!("received SIGQUIT"),
    }
}
