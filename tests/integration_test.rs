//! Integration tests for haikubot
//!
//! These drive the whole pipeline (decoder, filter, queue, worker, poster,
//! supervisor) from synthetic feeds with an in-memory write endpoint.

use async_trait::async_trait;
use haikubot::audit::AuditSink;
use haikubot::config::{BotConfig, FilterConfig};
use haikubot::filter::{CandidateEvent, EventFilter};
use haikubot::poster::{ActionPoster, CreatedRecord, RecordWriter, Session, StrongRef, XrpcError};
use haikubot::predicate::{MatchPredicate, MoraCounter};
use haikubot::producer::Producer;
use haikubot::queue;
use haikubot::stream::{
    decode_frame, CloseSignal, CommitNotification, Connector, FeedPost, FrameSource, StreamError,
    StreamFrame,
};
use haikubot::supervisor::{Pipeline, PipelineState, Supervisor};
use haikubot::watchdog::{Heartbeat, HeartbeatError, PingTarget};
use haikubot::worker::{Analyzer, Worker, WorkerExit, WorkerTimers};
use haikubot::HaikuBotError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const HAIKU: &str = "古池や蛙飛び込む水の音";

type FrameResult = Result<StreamFrame, StreamError>;

/// Write endpoint that remembers every created record
#[derive(Default)]
struct RecordingWriter {
    created: Mutex<Vec<serde_json::Value>>,
    create_calls: AtomicU32,
    always_fail: bool,
}

impl RecordingWriter {
    fn failing() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }

    fn texts(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|record| record["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl RecordWriter for RecordingWriter {
    async fn create_session(&self, handle: &str, _: &str) -> Result<Session, XrpcError> {
        Ok(Session {
            did: "did:plc:haikubot".to_string(),
            handle: handle.to_string(),
            access_jwt: "access".to_string(),
            refresh_jwt: "refresh".to_string(),
        })
    }

    async fn refresh_session(&self, refresh_jwt: &str) -> Result<Session, XrpcError> {
        self.create_session(refresh_jwt, "").await
    }

    async fn get_record(
        &self,
        _: &Session,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StrongRef, XrpcError> {
        Ok(StrongRef {
            uri: format!("at://{}/{}/{}", repo, collection, rkey),
            cid: format!("bafy-{}", rkey),
        })
    }

    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord, XrpcError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.always_fail {
            return Err(XrpcError::Status {
                method: "com.atproto.repo.createRecord".to_string(),
                status: 500,
                error: "InternalServerError".to_string(),
                message: "try again".to_string(),
            });
        }
        self.created.lock().unwrap().push(record.clone());
        Ok(CreatedRecord {
            uri: format!("at://{}/{}/reply{}", session.did, collection, n),
            cid: format!("bafyreply{}", n),
        })
    }
}

/// Frame source fed through a channel; ends when every sender is dropped
struct ChannelSource {
    rx: mpsc::UnboundedReceiver<FrameResult>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<FrameResult> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out a fresh channel source per dial and keeps the feeding ends
#[derive(Default)]
struct FeedConnector {
    scripted: Mutex<VecDeque<Vec<FrameResult>>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<FrameResult>>>,
    closed: Mutex<Vec<Arc<AtomicBool>>>,
    dials: AtomicU32,
}

impl FeedConnector {
    /// First dial replays `frames` and then ends the stream
    fn replay(frames: Vec<FrameResult>) -> Self {
        let connector = Self::default();
        connector.scripted.lock().unwrap().push_back(frames);
        connector
    }

    /// Every dial yields a stream that stays open and silent
    fn silent() -> Self {
        Self::default()
    }

    fn all_closed(&self) -> bool {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Connector for FeedConnector {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, StreamError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.closed.lock().unwrap().push(closed.clone());

        match self.scripted.lock().unwrap().pop_front() {
            Some(frames) => {
                for frame in frames {
                    let _ = tx.send(frame);
                }
                // Dropping tx ends the stream after the replay
            }
            None => self.feeds.lock().unwrap().push(tx),
        }

        Ok(Box::new(ChannelSource { rx, closed }))
    }
}

fn post_frame(seq: i64, text: &str) -> FrameResult {
    Ok(StreamFrame::Commit(
        CommitNotification::new(seq, "did:plc:alice").with_post(&format!("3k{}", seq), FeedPost::new(text)),
    ))
}

fn pipeline(writer: Arc<RecordingWriter>, predicate: Arc<dyn MatchPredicate>) -> Pipeline {
    let filter_config = FilterConfig::default();
    Pipeline {
        filter: Arc::new(EventFilter::new(&filter_config).unwrap()),
        analyzer: Arc::new(Analyzer::new(&filter_config, predicate).unwrap()),
        poster: Arc::new(ActionPoster::new(writer, "haiku.bsky.social", "secret")),
        audit: AuditSink::disabled(),
        heartbeat: None,
    }
}

fn supervisor(connector: Arc<FeedConnector>, writer: Arc<RecordingWriter>) -> Supervisor {
    Supervisor::new(
        connector,
        pipeline(writer, Arc::new(MoraCounter::default())),
        &BotConfig::new("haiku.bsky.social", "secret"),
    )
}

mod round_trip_tests {
    use super::*;

    #[tokio::test]
    async fn test_haiku_is_answered() {
        let connector = Arc::new(FeedConnector::replay(vec![post_frame(1, HAIKU)]));
        let writer = Arc::new(RecordingWriter::default());
        let supervisor = supervisor(connector.clone(), writer.clone());

        let err = supervisor.run_once().await.unwrap_err();
        assert!(matches!(err, HaikuBotError::Stream(StreamError::Ended)));
        assert_eq!(supervisor.state(), PipelineState::Restarting);

        let created = writer.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        let text = created[0]["text"].as_str().unwrap();
        assert_eq!(text, format!("{} #n575 #haiku", HAIKU));
        assert_eq!(created[0]["embed"]["$type"], "app.bsky.embed.record");
        assert_eq!(
            created[0]["embed"]["record"]["uri"],
            "at://did:plc:alice/app.bsky.feed.post/3k1"
        );
        assert!(connector.all_closed());
    }

    #[tokio::test]
    async fn test_plain_text_is_not_answered() {
        let connector = Arc::new(FeedConnector::replay(vec![post_frame(1, "hello world")]));
        let writer = Arc::new(RecordingWriter::default());

        let _ = supervisor(connector, writer.clone()).run_once().await;
        assert_eq!(writer.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_english_language_tag_is_rejected() {
        let english = CommitNotification::new(1, "did:plc:alice")
            .with_post("3k1", FeedPost::new(HAIKU).with_langs(["en"]));
        let connector = Arc::new(FeedConnector::replay(vec![Ok(StreamFrame::Commit(english))]));
        let writer = Arc::new(RecordingWriter::default());

        let _ = supervisor(connector, writer.clone()).run_once().await;
        assert_eq!(writer.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completion_tag_is_never_answered() {
        let tagged = format!("{} #n575 #haiku", HAIKU);
        let connector = Arc::new(FeedConnector::replay(vec![post_frame(1, &tagged)]));
        let writer = Arc::new(RecordingWriter::default());

        let _ = supervisor(connector, writer.clone()).run_once().await;
        assert_eq!(writer.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_jetstream_json_end_to_end() {
        let event = serde_json::json!({
            "did": "did:plc:bob",
            "time_us": 1725911162329308_i64,
            "kind": "commit",
            "commit": {
                "rev": "3l3qo2vutsw2b",
                "operation": "create",
                "collection": "app.bsky.feed.post",
                "rkey": "3l3qo2vuowo2b",
                "record": {
                    "$type": "app.bsky.feed.post",
                    "createdAt": "2024-09-09T19:46:02.102Z",
                    "langs": ["ja"],
                    "text": "古池や 蛙飛び込む 水の音 https://example.com"
                },
                "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
            }
        });
        let frame = decode_frame(&event.to_string());
        let connector = Arc::new(FeedConnector::replay(vec![frame]));
        let writer = Arc::new(RecordingWriter::default());

        let _ = supervisor(connector, writer.clone()).run_once().await;
        assert_eq!(writer.texts(), vec!["古池や 蛙飛び込む 水の音 #n575 #haiku"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_write_does_not_stop_the_worker() {
        let connector = Arc::new(FeedConnector::replay(vec![
            post_frame(1, HAIKU),
            post_frame(2, HAIKU),
        ]));
        let writer = Arc::new(RecordingWriter::failing());

        let err = supervisor(connector, writer.clone()).run_once().await.unwrap_err();
        assert!(matches!(err, HaikuBotError::Stream(StreamError::Ended)));
        // Three attempts for each of the two matches
        assert_eq!(writer.create_calls.load(Ordering::SeqCst), 6);
    }
}

mod queue_tests {
    use super::*;

    fn event(n: usize) -> CandidateEvent {
        CandidateEvent {
            collection: "app.bsky.feed.post".to_string(),
            author_id: "did:plc:alice".to_string(),
            record_key: format!("3k{}", n),
            text: format!("句{}", n),
        }
    }

    #[tokio::test]
    async fn test_fifo_beyond_capacity_through_pipeline() {
        // Everything fits the first pattern, so each event is posted exactly once
        let haiku_only: Arc<dyn MatchPredicate> =
            Arc::new(|_: &str, segments: &[usize]| segments.len() == 3);
        let frames: Vec<FrameResult> = (0..250).map(|i| post_frame(i, &format!("句{}", i))).collect();
        let connector = Arc::new(FeedConnector::replay(frames));
        let writer = Arc::new(RecordingWriter::default());
        let supervisor = Supervisor::new(
            connector,
            pipeline(writer.clone(), haiku_only),
            &BotConfig::new("haiku.bsky.social", "secret").with_queue_capacity(100),
        );

        let _ = supervisor.run_once().await;

        let expected: Vec<String> = (0..250).map(|i| format!("句{} #n575 #haiku", i)).collect();
        assert_eq!(writer.texts(), expected);
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full() {
        let capacity = 4;
        let (tx, mut rx) = queue::bounded(capacity);
        for n in 0..capacity {
            tx.enqueue(event(n)).await.unwrap();
        }

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.enqueue(event(capacity))).await;
        assert!(blocked.is_err(), "enqueue on a full queue must wait");

        assert_eq!(rx.dequeue().await.unwrap(), event(0));
        tokio::time::timeout(Duration::from_millis(50), tx.enqueue(event(capacity)))
            .await
            .expect("a dequeue frees a slot")
            .unwrap();

        for n in 1..=capacity {
            assert_eq!(rx.dequeue().await.unwrap(), event(n));
        }
    }

    /// Endless feed of haiku-script posts that counts how often it was read
    struct CountingSource {
        polled: Arc<AtomicU32>,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn next_frame(&mut self) -> Option<FrameResult> {
            let n = self.polled.fetch_add(1, Ordering::SeqCst) + 1;
            Some(post_frame(n as i64, &format!("句{}", n)))
        }

        async fn close(&mut self) {}
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_full_queue_stops_reading_the_stream() {
        let capacity = 4;
        let (tx, mut rx) = queue::bounded(capacity);
        let closer = CloseSignal::new();
        let polled = Arc::new(AtomicU32::new(0));
        let source = Box::new(CountingSource {
            polled: polled.clone(),
        });
        let producer = Producer::new(
            Arc::new(EventFilter::new(&FilterConfig::default()).unwrap()),
            AuditSink::disabled(),
        );

        let producer_closer = closer.clone();
        let run = tokio::spawn(async move { producer.run(source, &tx, &producer_closer).await });

        // Capacity queued, one more frame read and waiting for a slot
        settle().await;
        assert_eq!(polled.load(Ordering::SeqCst), capacity as u32 + 1);
        settle().await;
        assert_eq!(polled.load(Ordering::SeqCst), capacity as u32 + 1);

        // One dequeue lets exactly one more frame in
        assert_eq!(rx.dequeue().await.unwrap().text, "句1");
        settle().await;
        assert_eq!(polled.load(Ordering::SeqCst), capacity as u32 + 2);

        closer.close();
        assert!(run.await.unwrap().is_ok());
    }
}

mod watchdog_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_is_closed_by_watchdog() {
        let connector = Arc::new(FeedConnector::silent());
        let writer = Arc::new(RecordingWriter::default());
        let supervisor = supervisor(connector.clone(), writer);

        let start = tokio::time::Instant::now();
        let exit = supervisor.run_once().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(exit, WorkerExit::WatchdogTimeout);
        // 60 idle ticks of 10 seconds
        assert!(elapsed >= Duration::from_secs(600), "closed after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(610), "closed after {:?}", elapsed);
        assert!(connector.all_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_close_restarts_the_pipeline() {
        let connector = Arc::new(FeedConnector::silent());
        let writer = Arc::new(RecordingWriter::default());
        let supervisor = supervisor(connector.clone(), writer);

        let result = tokio::time::timeout(Duration::from_secs(605), supervisor.run_forever()).await;
        assert!(result.is_err(), "the supervisor never stops on its own");
        assert_eq!(connector.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_idle_counter() {
        let connector = Arc::new(FeedConnector::silent());
        let writer = Arc::new(RecordingWriter::default());
        let supervisor = Arc::new(supervisor(connector.clone(), writer));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run_once().await })
        };

        // One post every five minutes keeps the stream alive past the window
        for i in 0..3 {
            tokio::time::sleep(Duration::from_secs(300)).await;
            let feeds = connector.feeds.lock().unwrap();
            feeds[0].send(post_frame(i, "hello 世界")).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!run.is_finished(), "watchdog fired despite activity");

        // Silence from the last event onwards trips it
        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit, WorkerExit::WatchdogTimeout);
    }
}

mod heartbeat_tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingPing {
        pings: AtomicU32,
    }

    impl CountingPing {
        fn count(&self) -> u32 {
            self.pings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PingTarget for CountingPing {
        async fn ping(&self) -> Result<(), HeartbeatError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn worker(heartbeat_interval: Duration, pings: Arc<CountingPing>) -> Worker {
        let filter_config = FilterConfig::default();
        let analyzer = Analyzer::new(&filter_config, Arc::new(MoraCounter::default())).unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let poster = ActionPoster::new(writer, "haiku.bsky.social", "secret");
        let config = BotConfig::new("haiku.bsky.social", "secret")
            .with_heartbeat_interval(heartbeat_interval);

        Worker::new(Arc::new(analyzer), Arc::new(poster), WorkerTimers::from(&config))
            .with_heartbeat(Some(Heartbeat::with_target(pings)))
    }

    fn chatter(n: usize) -> CandidateEvent {
        CandidateEvent {
            collection: "app.bsky.feed.post".to_string(),
            author_id: "did:plc:alice".to_string(),
            record_key: format!("3k{}", n),
            text: "hello 世界".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_every_five_minutes() {
        let pings = Arc::new(CountingPing::default());
        let worker = worker(Duration::from_secs(300), pings.clone());
        let (mut tx, rx) = queue::bounded(10);
        let run = tokio::spawn(async move { worker.run(rx, CloseSignal::new()).await });

        // Fifteen minutes of steady traffic
        for n in 0..9 {
            tokio::time::sleep(Duration::from_secs(100)).await;
            tx.enqueue(chatter(n)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pings.count(), 3);

        tx.close();
        assert_eq!(run.await.unwrap(), WorkerExit::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_do_not_hold_off_the_watchdog() {
        let pings = Arc::new(CountingPing::default());
        let worker = worker(Duration::from_secs(240), pings.clone());
        let (_tx, rx) = queue::bounded(10);
        let closer = CloseSignal::new();

        let start = tokio::time::Instant::now();
        let exit = worker.run(rx, closer.clone()).await;
        let elapsed = start.elapsed();

        assert_eq!(exit, WorkerExit::WatchdogTimeout);
        assert!(elapsed >= Duration::from_secs(600), "closed after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(610), "closed after {:?}", elapsed);
        assert!(closer.is_closed());

        // Pings at 4 and 8 minutes
        tokio::task::yield_now().await;
        assert_eq!(pings.count(), 2);
    }
}
