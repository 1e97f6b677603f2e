//! Structures to keep the process alive until some event occurs

use futures::{
    channel::mpsc::{channel, Receiver, Sender},
    pin_mut,
    prelude::*,
    select,
};
use std::{
    fmt,
    fmt::{Error as FmtError, Formatter},
    time::Duration,
};
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Reason why the heart stopped beating
#[derive(Debug, Clone)]
pub enum DeathReason {
    /// Internal kill signal has been sent
    Killed(String),
    /// Predetermined lifetime has been exceeded
    LifetimeExceeded,
    /// SIGINT or other process-external cause
    Terminated,
}

impl fmt::Display for DeathReason {
    fn fmt(&self, w: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            DeathReason::Killed(reason) => write!(w, "Killed ({})", reason),
            DeathReason::LifetimeExceeded => write!(w, "Lifetime was exceeded"),
            DeathReason::Terminated => write!(w, "Terminated due to external signal"),
        }
    }
}

/// Lifecycle management struct that can be used to keep the application alive
pub struct Heart {
    /// Receiver for kill requests sent by a linked stone
    rx: Receiver<String>,
    /// Maximum lifetime duration
    lifetime: Option<Duration>,
}

impl Heart {
    /// Creates a new heart and linked stone with no lifetime limit
    pub fn new() -> (Self, HeartStone) {
        Heart::internal_new(None)
    }

    /// Creates a new heart with no lifetime and discards the linked stone
    pub fn without_heart_stone() -> Self {
        Heart::internal_new(None).0
    }

    /// Creates a new heart and linked stone with a lifetime
    pub fn with_lifetime(lifetime: Duration) -> (Self, HeartStone) {
        Heart::internal_new(Some(lifetime))
    }

    /// Future that waits until the heart dies for the returned reason
    pub async fn death(&mut self) -> DeathReason {
        let mut age_future = match self.lifetime {
            Some(lifetime) => sleep(lifetime).boxed(),
            None => futures::future::pending().boxed(),
        }
        .fuse();

        debug!("Heart starts beating");

        loop {
            select! {
                reason = self.rx.next() => {
                    if let Some(reason) = reason {
                        return DeathReason::Killed(reason);
                    }
                },
                () = age_future => return DeathReason::LifetimeExceeded,
                () = Heart::termination_signal().fuse() => return DeathReason::Terminated,
            };
        }
    }

    fn internal_new(lifetime: Option<Duration>) -> (Self, HeartStone) {
        if let Some(lifetime) = lifetime {
            info!("Lifetime set to {} seconds", lifetime.as_secs());
        }

        let (tx, rx) = channel(2);
        let heart = Self { rx, lifetime };
        let stone = HeartStone::new(tx);

        (heart, stone)
    }

    async fn termination_signal() {
        let mut sigterm_stream = signal(SignalKind::terminate()).unwrap();
        let sigterm = sigterm_stream.recv().fuse();
        let ctrl_c = ctrl_c().fuse();

        pin_mut!(sigterm, ctrl_c);

        select! {
            _ = sigterm => {},
            _ = ctrl_c => {},
        };
    }
}

/// Remote controller for the heart
#[derive(Clone)]
pub struct HeartStone {
    remote: Sender<String>,
}

impl HeartStone {
    fn new(remote: Sender<String>) -> Self {
        Self { remote }
    }

    /// Kill the associated heart
    pub async fn kill(&mut self, reason: String) {
        if let Err(e) = self.remote.send(reason).await {
            error!("Failed to interact with Heart: {}", e);
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use futures::poll;
    use tokio::task::{spawn, yield_now};
    use tokio::time::sleep;

    #[tokio::test]
    async fn live_without_lifetime() {
        let (mut heart, _stone) = Heart::new();

        let handle = spawn(async move { heart.death().await });
        sleep(Duration::from_millis(100)).await;
        yield_now().await;

        assert!(!poll!(handle).is_ready());
    }

    #[tokio::test]
    async fn die_when_killed() {
        let (mut heart, mut stone) = Heart::new();

        let handle = spawn(async move { heart.death().await });
        stone.kill("Testing".to_owned()).await;
        yield_now().await;

        assert!(poll!(handle).is_ready());
    }

    #[tokio::test]
    async fn die_after_lifetime() {
        let lifetime = Duration::from_millis(10);
        let (mut heart, _stone) = Heart::with_lifetime(lifetime);

        let handle = spawn(async move { heart.death().await });
        sleep(lifetime).await;
        yield_now().await;

        assert!(poll!(handle).is_ready());
    }
}
