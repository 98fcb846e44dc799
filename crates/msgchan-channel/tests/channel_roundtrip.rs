#![cfg(unix)]

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use msgchan_channel::{
    BackpressurePolicy, ChannelConfig, ChannelError, ChannelStatus, Direction, FaultKind,
    MessageChannel, DEFAULT_QUEUE_CAPACITY,
};
use msgchan_transport::{Endpoint, TcpTransport};

const WAIT: Duration = Duration::from_secs(5);

fn pair() -> (MessageChannel, MessageChannel) {
    let (a, b) = UnixStream::pair().expect("socket pair");
    (
        MessageChannel::open(a).expect("open a"),
        MessageChannel::open(b).expect("open b"),
    )
}

fn wait_for_status(channel: &MessageChannel, status: ChannelStatus) {
    let deadline = Instant::now() + WAIT;
    while channel.status() != status {
        assert!(Instant::now() < deadline, "channel never reached {status}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn messages_round_trip_in_order() {
    let (left, right) = pair();

    for i in 0..100u32 {
        left.send(format!("msg-{i}")).unwrap();
    }
    for i in 0..100u32 {
        let msg = right.receive_timeout(WAIT).unwrap();
        assert_eq!(msg, format!("msg-{i}").as_bytes());
    }

    right.send(&b"back"[..]).unwrap();
    assert_eq!(left.receive_timeout(WAIT).unwrap(), &b"back"[..]);
}

#[test]
fn empty_message_is_delivered() {
    let (left, right) = pair();
    left.send(Vec::<u8>::new()).unwrap();
    left.send(&b"after"[..]).unwrap();

    assert!(right.receive_timeout(WAIT).unwrap().is_empty());
    assert_eq!(right.receive_timeout(WAIT).unwrap(), &b"after"[..]);
}

#[test]
fn concurrent_producers_keep_per_thread_order() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 250;

    let (left, right) = pair();
    let left = Arc::new(left);

    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let left = Arc::clone(&left);
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    left.send(format!("{t}:{seq}")).unwrap();
                }
            })
        })
        .collect();

    let mut next = [0usize; THREADS];
    for _ in 0..THREADS * PER_THREAD {
        let msg = right.receive_timeout(WAIT).unwrap();
        let text = std::str::from_utf8(&msg).unwrap();
        let (t, seq) = text.split_once(':').unwrap();
        let t: usize = t.parse().unwrap();
        let seq: usize = seq.parse().unwrap();
        assert_eq!(seq, next[t], "producer {t} reordered");
        next[t] += 1;
    }

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(next, [PER_THREAD; THREADS]);
    assert!(right.try_receive().unwrap().is_none());
}

#[test]
fn receive_blocks_until_message_arrives() {
    let (left, right) = pair();
    let right = Arc::new(right);

    let consumer = {
        let right = Arc::clone(&right);
        thread::spawn(move || right.receive())
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());

    left.send(&b"wake"[..]).unwrap();
    let msg = consumer.join().unwrap().unwrap();
    assert_eq!(msg, &b"wake"[..]);
}

#[test]
fn receive_timeout_expires_on_quiet_channel() {
    let (_left, right) = pair();
    let err = right
        .receive_timeout(Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(err, ChannelError::Timeout(_)));
    assert_eq!(right.status(), ChannelStatus::Running);
}

#[test]
fn messages_before_close_are_still_delivered() {
    let (local, mut remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open(local).unwrap();

    remote.write_all(&[0, 0, 0, 3, b'o', b'n', b'e']).unwrap();
    drop(remote);

    assert_eq!(channel.receive_timeout(WAIT).unwrap(), &b"one"[..]);
    match channel.receive_timeout(WAIT) {
        Err(ChannelError::Failed(fault)) => {
            assert_eq!(fault.direction, Direction::Receive);
            assert_eq!(fault.kind, FaultKind::ConnectionClosed);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn truncated_frame_fails_without_partial_message() {
    let (local, mut remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open(local).unwrap();

    remote.write_all(&[0, 0, 0, 10, b'a', b'b', b'c']).unwrap();
    drop(remote);

    let err = channel.receive_timeout(WAIT).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Failed(ref fault) if fault.kind == FaultKind::ConnectionClosed
    ));
    assert_eq!(channel.pending_receive_count(), 0);
    assert!(channel.try_receive().is_err());

    wait_for_status(&channel, ChannelStatus::Stopped);
    assert!(channel.fault().is_some());
}

#[test]
fn oversized_inbound_frame_is_protocol_fault() {
    let (local, mut remote) = UnixStream::pair().unwrap();
    let channel =
        MessageChannel::open_with_config(local, ChannelConfig::default().with_max_payload_size(16))
            .unwrap();

    remote.write_all(&1000u32.to_be_bytes()).unwrap();

    let err = channel.receive_timeout(WAIT).unwrap_err();
    match err {
        ChannelError::Failed(fault) => {
            assert_eq!(fault.kind, FaultKind::Protocol);
            assert_eq!(fault.direction, Direction::Receive);
        }
        other => panic!("expected protocol fault, got {other:?}"),
    }

    // The whole channel stops, so the peer observes the shutdown.
    let mut buf = [0u8; 1];
    assert_eq!(remote.read(&mut buf).unwrap(), 0);
}

#[test]
fn fault_wakes_receivers_and_fails_senders() {
    let (local, remote) = UnixStream::pair().unwrap();
    let channel = Arc::new(MessageChannel::open(local).unwrap());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.receive())
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    drop(remote);

    for waiter in waiters {
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, ChannelError::Failed(_)));
    }

    wait_for_status(&channel, ChannelStatus::Stopped);
    let err = channel.send(&b"late"[..]).unwrap_err();
    assert!(matches!(err, ChannelError::Failed(_)));
    assert!(err.is_terminal());
}

#[test]
fn stop_is_idempotent_and_wakes_receivers() {
    let (left, _right) = pair();
    let left = Arc::new(left);

    let waiter = {
        let left = Arc::clone(&left);
        thread::spawn(move || left.receive())
    };
    thread::sleep(Duration::from_millis(30));

    left.stop();
    left.stop();

    assert!(matches!(
        waiter.join().unwrap(),
        Err(ChannelError::Stopped)
    ));
    assert_eq!(left.status(), ChannelStatus::Stopped);
    assert!(left.fault().is_none());
    assert!(matches!(left.send(&b"x"[..]), Err(ChannelError::Stopped)));
}

#[test]
fn stop_discards_queued_messages() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open_with_config(local, ChannelConfig::default()).unwrap();

    // Nobody reads the peer, so large messages pile up behind the first write.
    let big = vec![7u8; 1 << 20];
    for _ in 0..4 {
        channel.send(big.clone()).unwrap();
    }

    channel.stop();
    assert_eq!(channel.pending_send_count(), 0);
    assert!(channel.take_unsent().is_empty());
}

#[test]
fn default_send_never_blocks_on_stalled_peer() {
    const COUNT: usize = 10_000;

    let (local, _remote) = UnixStream::pair().unwrap();
    let channel = Arc::new(MessageChannel::open(local).unwrap());

    // The peer never reads, so the socket buffer fills long before COUNT.
    let producer = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            let payload = vec![3u8; 1024];
            for _ in 0..COUNT {
                channel.send(payload.clone()).unwrap();
            }
        })
    };

    let deadline = Instant::now() + WAIT;
    while !producer.is_finished() {
        assert!(
            Instant::now() < deadline,
            "send suspended with {} pending",
            channel.pending_send_count()
        );
        thread::sleep(Duration::from_millis(5));
    }
    producer.join().unwrap();

    assert!(channel.pending_send_count() > DEFAULT_QUEUE_CAPACITY);
    assert_eq!(channel.status(), ChannelStatus::Running);
}

#[test]
fn bounded_block_policy_suspends_sender() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let config = ChannelConfig::default().with_send_queue_capacity(Some(2));
    let channel = Arc::new(MessageChannel::open_with_config(local, config).unwrap());

    let producer = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            let big = vec![4u8; 1 << 20];
            for _ in 0..10 {
                if channel.send(big.clone()).is_err() {
                    break;
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!producer.is_finished());

    // Stopping closes the queue and releases the blocked producer.
    channel.stop();
    producer.join().unwrap();
}

#[test]
fn reject_policy_reports_full_queue() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let config = ChannelConfig::default()
        .with_send_queue_capacity(Some(1))
        .with_backpressure(BackpressurePolicy::Reject);
    let channel = MessageChannel::open_with_config(local, config).unwrap();

    let big = vec![1u8; 1 << 20];
    let mut rejected = None;
    for _ in 0..10 {
        if let Err(err) = channel.send(big.clone()) {
            rejected = Some(err);
            break;
        }
    }

    assert!(matches!(
        rejected,
        Some(ChannelError::QueueFull { capacity: 1 })
    ));
    assert_eq!(channel.status(), ChannelStatus::Running);
}

#[test]
fn try_send_never_blocks_on_blocking_policy() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let config = ChannelConfig::default().with_send_queue_capacity(Some(1));
    let channel = MessageChannel::open_with_config(local, config).unwrap();

    let big = vec![2u8; 1 << 20];
    let full = (0..10).any(|_| {
        matches!(
            channel.try_send(big.clone()),
            Err(ChannelError::QueueFull { .. })
        )
    });
    assert!(full);
}

#[test]
fn flush_waits_for_writes() {
    let (local, mut remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open(local).unwrap();

    for _ in 0..10 {
        channel.send(&b"abc"[..]).unwrap();
    }
    channel.flush(Some(WAIT)).unwrap();
    assert_eq!(channel.pending_send_count(), 0);

    let mut wire = vec![0u8; 10 * 7];
    remote.read_exact(&mut wire).unwrap();
    assert_eq!(&wire[..7], &[0, 0, 0, 3, b'a', b'b', b'c']);
}

#[test]
fn flush_times_out_when_peer_does_not_read() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open(local).unwrap();

    channel.send(vec![0u8; 1 << 20]).unwrap();
    let err = channel.flush(Some(Duration::from_millis(50))).unwrap_err();
    assert!(matches!(err, ChannelError::Timeout(_)));
}

#[test]
fn unsent_messages_recoverable_after_fault() {
    let (local, remote) = UnixStream::pair().unwrap();
    let channel = MessageChannel::open_with_config(local, ChannelConfig::default()).unwrap();

    let big = vec![9u8; 1 << 20];
    for _ in 0..5 {
        channel.send(big.clone()).unwrap();
    }
    assert!(channel.take_unsent().is_empty(), "running channel keeps its queue");

    drop(remote);
    wait_for_status(&channel, ChannelStatus::Stopped);

    let unsent = channel.take_unsent();
    assert_eq!(unsent.len(), 5);
    assert!(unsent.iter().all(|m| m[..] == big[..]));
    assert!(channel.take_unsent().is_empty());
}

#[test]
fn loopback_tcp_echo() {
    let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
    let addr = transport.local_addr().to_string();

    let server = thread::spawn(move || {
        let stream = transport.accept().unwrap();
        let channel = MessageChannel::open(stream).unwrap();
        for _ in 0..3 {
            let msg = channel.receive().unwrap();
            channel.send(msg).unwrap();
        }
        channel.flush(Some(WAIT)).unwrap();
    });

    let client = MessageChannel::open(TcpTransport::connect(&addr).unwrap()).unwrap();
    assert!(client.peer_label().starts_with("tcp://127.0.0.1:"));
    for word in ["one", "two", "three"] {
        client.send(word).unwrap();
    }
    for word in ["one", "two", "three"] {
        assert_eq!(client.receive_timeout(WAIT).unwrap(), word.as_bytes());
    }

    server.join().unwrap();
}

#[test]
fn channel_ids_are_unique() {
    let (left, right) = pair();
    assert_ne!(left.id(), right.id());
}

/// Endpoint without a peer, for construction failure paths.
struct Unconnected;

impl Read for Unconnected {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }
}

impl Write for Unconnected {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Endpoint for Unconnected {
    fn try_clone_endpoint(&self) -> io::Result<Self> {
        Ok(Unconnected)
    }

    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }

    fn peer_label(&self) -> io::Result<String> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn unconnected_endpoint_fails_construction() {
    let err = MessageChannel::open(Unconnected).unwrap_err();
    match err {
        ChannelError::Construction { source, .. } => {
            assert_eq!(source.kind(), io::ErrorKind::NotConnected);
        }
        other => panic!("expected construction error, got {other:?}"),
    }
}

/// Connected endpoint that cannot be duplicated.
struct NoClone(UnixStream);

impl Read for NoClone {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for NoClone {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Endpoint for NoClone {
    fn try_clone_endpoint(&self) -> io::Result<Self> {
        Err(io::Error::other("descriptor table full"))
    }

    fn shutdown(&self) -> io::Result<()> {
        Endpoint::shutdown(&self.0)
    }

    fn peer_label(&self) -> io::Result<String> {
        self.0.peer_label()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.set_write_timeout(timeout)
    }
}

#[test]
fn clone_failure_fails_construction() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let err = MessageChannel::open(NoClone(local)).unwrap_err();
    assert!(matches!(err, ChannelError::Construction { .. }));
    assert!(err.is_terminal());
}
