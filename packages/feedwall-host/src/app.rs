//! The single task that owns the controller: input events in, ticks out.

use std::future;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::display::DisplaySurface;
use crate::feed::{FeedModule, Person};
use crate::layout::{LayoutPreset, Viewport};
use crate::session::{Checkpoint, Selection, SessionController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Select(LayoutPreset),
    Stop,
    Quit,
}

impl Input {
    /// `1`-`3` pick a layout, an empty line, space or `s` stops, `q` quits.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" | "s" | "stop" => Some(Self::Stop),
            "q" | "quit" => Some(Self::Quit),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) => LayoutPreset::from_key(key).map(Self::Select),
                    _ => None,
                }
            }
        }
    }
}

pub struct App<M, D, V> {
    controller: SessionController<M, D>,
    people: Vec<Person>,
    viewport: V,
    tick_interval: Duration,
}

impl<M, D, V> App<M, D, V>
where
    M: FeedModule,
    D: DisplaySurface,
    V: Viewport,
{
    pub fn new(
        controller: SessionController<M, D>,
        people: Vec<Person>,
        viewport: V,
        tick_interval: Duration,
    ) -> Self {
        Self {
            controller,
            people,
            viewport,
            tick_interval,
        }
    }

    /// Run until `Quit` or the input channel closes, then tear the session
    /// down. Returns the controller for inspection.
    ///
    /// Each tick runs to completion before the next input is looked at, and
    /// the next tick is scheduled `tick_interval` after the previous one
    /// finished.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<Input>,
    ) -> anyhow::Result<SessionController<M, D>> {
        let mut next_tick: Option<Instant> = None;

        loop {
            let due = next_tick;
            let tick_due = async move {
                match due {
                    Some(at) => sleep_until(at).await,
                    None => future::pending().await,
                }
            };

            tokio::select! {
                input = inputs.recv() => match input {
                    None | Some(Input::Quit) => break,
                    Some(Input::Select(preset)) => {
                        let layout = preset.build(&self.viewport);
                        match self.controller.select_layout(layout, &self.people) {
                            Ok(Selection::Created(_)) => next_tick = Some(Instant::now()),
                            Ok(Selection::Ignored) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, ?preset, "layout selection failed");
                                self.controller.surface_mut().show_error(&err.to_string());
                                next_tick = None;
                            }
                        }
                    }
                    Some(Input::Stop) => {
                        self.controller.request_stop();
                    }
                },
                () = tick_due => {
                    next_tick = match self.controller.checkpoint() {
                        Ok(Checkpoint::Continue) => Some(Instant::now() + self.tick_interval),
                        Ok(Checkpoint::Completed | Checkpoint::Idle) => None,
                        // Already surfaced by the controller, which is now `Failed`.
                        Err(_) => None,
                    };
                }
            }
        }

        self.controller.destroy()?;
        tracing::info!("feedwall stopped");
        Ok(self.controller)
    }
}

/// Forward parsed lines until `Quit` or EOF, which counts as `Quit`.
///
/// Blocking: returns right after forwarding `Quit` so no further read is
/// started, or once the receiver is gone.
pub fn forward_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<Input>) -> std::io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        match Input::parse(&line) {
            Some(input) => {
                if tx.blocking_send(input).is_err() || input == Input::Quit {
                    return Ok(());
                }
            }
            None => tracing::debug!(line = %line, "unrecognized input"),
        }
    }
    let _ = tx.blocking_send(Input::Quit);
    Ok(())
}

/// Read stdin on its own OS thread.
///
/// A read blocked in the terminal cannot be cancelled, so it must not sit on
/// the runtime's blocking pool, which is joined at shutdown. The thread is
/// never joined and ends with the process.
pub fn spawn_stdin_forwarder(tx: mpsc::Sender<Input>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("feedwall-stdin".into())
        .spawn(move || {
            if let Err(err) = forward_lines(std::io::stdin().lock(), &tx) {
                tracing::error!(%err, "reading stdin failed");
                let _ = tx.blocking_send(Input::Quit);
            }
        })
}
