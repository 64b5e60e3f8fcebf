//! Per-path pending-flag debounce: a burst of N raw events on one path
//! collapses into exactly one delayed forward, instead of scheduling a
//! fresh timer for every event. Grounded directly on the original
//! implementation's `debounce()` goroutine: a `waiting` flag set per path,
//! cleared (and the path forwarded) when its one delayed task fires.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;

pub struct Debouncer {
    input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(input: mpsc::Receiver<String>, output: mpsc::Sender<String>, delay: Duration) -> Self {
        Self {
            input,
            output,
            delay,
        }
    }

    pub async fn run(mut self) {
        let (fired_tx, mut fired_rx) = mpsc::channel::<String>(256);
        let mut pending: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                maybe_path = self.input.recv() => {
                    match maybe_path {
                        Some(path) => {
                            if pending.insert(path.clone()) {
                                let tx = fired_tx.clone();
                                let delay = self.delay;
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    let _ = tx.send(path).await;
                                });
                            }
                        }
                        None => {
                            // The watcher's channel closed; let any forwards
                            // already in flight settle before stopping,
                            // instead of silently dropping them.
                            drop(fired_tx);
                            while let Some(path) = fired_rx.recv().await {
                                pending.remove(&path);
                                if self.output.send(path).await.is_err() {
                                    break;
                                }
                            }
                            break;
                        }
                    }
                }
                Some(path) = fired_rx.recv() => {
                    pending.remove(&path);
                    if self.output.send(path).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn burst_on_one_path_forwards_once() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let debouncer = Debouncer::new(in_rx, out_tx, Duration::from_millis(20));
        tokio::spawn(debouncer.run());

        for _ in 0..5 {
            in_tx.send("a/b.txt".to_string()).await.unwrap();
        }
        drop(in_tx);

        let first = out_rx.recv().await;
        assert_eq!(first, Some("a/b.txt".to_string()));
        // Only one forward for the whole burst.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn distinct_paths_each_forward() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let debouncer = Debouncer::new(in_rx, out_tx, Duration::from_millis(10));
        tokio::spawn(debouncer.run());

        in_tx.send("a.txt".to_string()).await.unwrap();
        in_tx.send("b.txt".to_string()).await.unwrap();
        drop(in_tx);

        let mut seen = vec![out_rx.recv().await.unwrap(), out_rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }
}
