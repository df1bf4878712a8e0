//! Terminal operator input for enrollment.
//!
//! Stdin is read on a helper thread so the capture loop never blocks on it.

use facegate_core::{OperatorInput, OperatorSignal};
use std::io::{BufRead, BufReader};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// Map one line typed by the operator to a command.
///
/// An empty line (Enter) captures; `q` or `quit` cancels. Anything else is ignored.
pub fn parse_line(line: &str) -> Option<OperatorSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(OperatorSignal::Capture),
        "q" | "quit" => Some(OperatorSignal::Cancel),
        _ => None,
    }
}

/// Commands typed on a reader, delivered through a channel.
pub struct LineInput {
    rx: Receiver<OperatorSignal>,
}

impl LineInput {
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(std::io::stdin()))
    }

    /// Read lines from `reader` on a helper thread. End of input cancels.
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                match parse_line(&line) {
                    Some(signal) => {
                        if tx.send(signal).is_err() {
                            return;
                        }
                    }
                    None => eprintln!("press Enter to capture or q to cancel"),
                }
            }
            let _ = tx.send(OperatorSignal::Cancel);
        });
        Self { rx }
    }
}

impl OperatorInput for LineInput {
    fn poll(&mut self) -> Option<OperatorSignal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(OperatorSignal::Cancel),
        }
    }
}
