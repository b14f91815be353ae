use std::error::Error;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use recognition_core::detection::domain::detector_kind::DetectorKind;
use recognition_core::protocol::server_event::ServerEvent;

use crate::capture::{acquire_with_retry, FrameSource};
use crate::recogniser::{ObjectsRecogniser, RecogniserError};
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Switch(DetectorKind),
}

/// `face` / `palm` switch detector, `quit` (or `q`) exits. Blank lines are
/// ignored.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    match line.trim() {
        "" => Ok(None),
        "quit" | "q" => Ok(Some(Command::Quit)),
        other => other
            .parse::<DetectorKind>()
            .map(|kind| Some(Command::Switch(kind)))
            .map_err(|e| e.to_string()),
    }
}

/// Unwraps a submission attempt. A failure is logged and arms `retry_at`,
/// so the loop tries again after `delay` instead of stopping.
fn take_submission(
    result: Result<Option<Vec<u8>>, RecogniserError>,
    retry_at: &mut Option<Instant>,
    delay: Duration,
) -> Option<Vec<u8>> {
    match result {
        Ok(next) => next,
        Err(e) => {
            log::error!("Could not prepare a frame: {e}; retrying in {}ms", delay.as_millis());
            *retry_at = Some(Instant::now() + delay);
            None
        }
    }
}

/// Connects to the relay and drives `recogniser` until the server closes
/// the socket or `quit` is read from stdin.
pub async fn run<S, P>(
    url: &str,
    recogniser: ObjectsRecogniser<S, P>,
    retry_delay: Duration,
) -> Result<(), Box<dyn Error>>
where
    S: FrameSource,
    P: Surface,
{
    let commands = BufReader::new(tokio::io::stdin()).lines();
    run_with_commands(url, recogniser, retry_delay, commands).await
}

async fn run_with_commands<S, P, R>(
    url: &str,
    mut recogniser: ObjectsRecogniser<S, P>,
    retry_delay: Duration,
    mut commands: tokio::io::Lines<R>,
) -> Result<(), Box<dyn Error>>
where
    S: FrameSource,
    P: Surface,
    R: tokio::io::AsyncBufRead + Unpin,
{
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    log::info!("Connected to {url}");
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (width, height) = acquire_with_retry(recogniser.source_mut(), retry_delay).await;
    let mut retry_at = None;
    let first = recogniser.start(width, height).map(Some);
    if let Some(first) = take_submission(first, &mut retry_at, retry_delay) {
        ws_tx.send(Message::Binary(first.into())).await?;
    }

    let synchronise = recogniser.options().synchronise;
    let mut repaint = tokio::time::interval(recogniser.options().repaint_delay);
    let mut stdin_open = true;

    loop {
        let outgoing = tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ServerEvent::from_json(text.as_str()) {
                        Ok(event) => recogniser.handle_event(&event),
                        Err(e) => {
                            log::warn!("Ignoring server message: {e}");
                            Ok(None)
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => Ok(None),
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            _ = repaint.tick(), if !synchronise => {
                recogniser.repaint();
                Ok(None)
            }
            _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                retry_at = None;
                recogniser.next_submission().map(Some)
            }
            line = commands.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(None) => Ok(None),
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(Command::Switch(kind))) => recogniser.change_recogniser(kind),
                        Err(e) => {
                            log::warn!("{e}; still recognising on {}", recogniser.current_kind());
                            Ok(None)
                        }
                    },
                    Ok(None) => {
                        stdin_open = false;
                        Ok(None)
                    }
                    Err(e) => {
                        log::warn!("Stopped reading commands: {e}");
                        stdin_open = false;
                        Ok(None)
                    }
                }
            }
        };

        if let Some(next) = take_submission(outgoing, &mut retry_at, retry_delay) {
            ws_tx.send(Message::Binary(next.into())).await?;
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    log::info!(
        "Disconnected after {} recognition error(s)",
        recogniser.errors()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::recogniser::RecogniserOptions;
    use crate::surface::LogSurface;
    use recognition_core::protocol::envelope::decode_submission;
    use recognition_core::shared::frame::Frame;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    struct BlankSource;

    impl FrameSource for BlankSource {
        fn acquire(&mut self) -> Result<(u32, u32), CaptureError> {
            Ok((8, 6))
        }

        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            Ok(Frame::blank(8, 6, 0))
        }
    }

    /// Fails every frame until `fail_for` calls have been made.
    struct RecoveringSource {
        calls: Arc<AtomicUsize>,
        fail_for: usize,
    }

    impl FrameSource for RecoveringSource {
        fn acquire(&mut self) -> Result<(u32, u32), CaptureError> {
            Ok((8, 6))
        }

        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_for {
                Err(CaptureError::NotAcquired)
            } else {
                Ok(Frame::blank(8, 6, 0))
            }
        }
    }

    /// Accepts one client, answers each submission with `reply(n)` until it
    /// returns `None`, then closes. Returns the channels submitted.
    async fn fake_relay(
        reply: impl Fn(usize) -> Option<String> + Send + 'static,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut channels = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Binary(data) = msg else { continue };
                channels.push(decode_submission(&data).unwrap().channel.to_string());
                match reply(channels.len()) {
                    Some(json) => ws.send(Message::Text(json.into())).await.unwrap(),
                    None => {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
            channels
        });
        (url, server)
    }

    fn commands(input: &'static str) -> tokio::io::Lines<&'static [u8]> {
        input.as_bytes().lines()
    }

    #[rstest]
    #[case::blank("   ", Ok(None))]
    #[case::quit("quit", Ok(Some(Command::Quit)))]
    #[case::short_quit("q", Ok(Some(Command::Quit)))]
    #[case::face("face", Ok(Some(Command::Switch(DetectorKind::Face))))]
    #[case::palm_padded("  palm \n", Ok(Some(Command::Switch(DetectorKind::Palm))))]
    fn test_parse_command(#[case] line: &str, #[case] expected: Result<Option<Command>, String>) {
        assert_eq!(parse_command(line), expected);
    }

    #[test]
    fn test_parse_unknown_command_is_error() {
        assert!(parse_command("cat").is_err());
    }

    #[tokio::test]
    async fn test_failed_submission_arms_retry() {
        let mut retry_at = None;
        let next = take_submission(
            Err(RecogniserError::NotStarted),
            &mut retry_at,
            Duration::from_millis(50),
        );
        assert!(next.is_none());
        assert!(retry_at.is_some_and(|at| at > Instant::now()));

        let mut retry_at = None;
        let next = take_submission(Ok(Some(vec![1])), &mut retry_at, Duration::from_millis(50));
        assert_eq!(next, Some(vec![1]));
        assert!(retry_at.is_none());
    }

    #[tokio::test]
    async fn test_each_reply_triggers_next_submission() {
        let (url, server) = fake_relay(|n| {
            (n < 3).then(|| r#"{"event":"face-recognition","data":[]}"#.to_string())
        })
        .await;
        let recogniser = ObjectsRecogniser::new(BlankSource, LogSurface::default(), RecogniserOptions::default());

        tokio::time::timeout(WAIT, run_with_commands(&url, recogniser, WAIT, commands("")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(server.await.unwrap(), vec!["face-recognition"; 3]);
    }

    #[tokio::test]
    async fn test_switch_command_submits_on_new_channel() {
        let (url, server) = fake_relay(|n| {
            (n < 2).then(|| r#"{"event":"palm-recognition","data":[]}"#.to_string())
        })
        .await;
        let recogniser = ObjectsRecogniser::new(BlankSource, LogSurface::default(), RecogniserOptions::default());

        // Every reply is on palm-recognition; one that lands before the
        // switch has no listener and is dropped.
        tokio::time::timeout(WAIT, run_with_commands(&url, recogniser, WAIT, commands("palm\n")))
            .await
            .unwrap()
            .unwrap();

        let channels = server.await.unwrap();
        assert_eq!(channels[0], "face-recognition");
        assert!(channels[1..].iter().all(|c| c == "palm-recognition"));
    }

    #[tokio::test]
    async fn test_capture_failure_is_retried_instead_of_exiting() {
        let (url, server) = fake_relay(|_| None).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let source = RecoveringSource {
            calls: Arc::clone(&calls),
            fail_for: 12,
        };
        let recogniser = ObjectsRecogniser::new(source, LogSurface::default(), RecogniserOptions::default());

        tokio::time::timeout(
            WAIT,
            run_with_commands(&url, recogniser, Duration::from_millis(20), commands("")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(server.await.unwrap(), vec!["face-recognition"]);
        assert!(calls.load(Ordering::SeqCst) > 12);
    }
}
