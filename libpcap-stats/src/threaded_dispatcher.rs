use crate::dispatcher::{decode_chain, DispatchCounters, StatsAnalyzer};
use crate::registry::DecoderRegistry;
use crate::stats::Aggregator;
use crossbeam_channel::{bounded, Sender};
use fnv::FnvHasher;
use libpcap_tools::{Config, Error, Frame, FrameAnalyzer, Linktype};
use std::hash::Hasher;
use std::sync::Arc;
use std::thread;

/// Maximum number of frames waiting for one worker
const QUEUE_LEN: usize = 1024;

const ETHERTYPE_IPV4: u16 = 0x0800;

/// Frame copied out of the capture buffer, to be sent to a worker
struct OwnedFrame {
    index: usize,
    link_type: Linktype,
    data: Vec<u8>,
    caplen: u32,
    origlen: u32,
}

impl OwnedFrame {
    fn new(frame: &Frame) -> Self {
        OwnedFrame {
            index: frame.index,
            link_type: frame.link_type,
            data: frame.data.to_vec(),
            caplen: frame.caplen,
            origlen: frame.origlen,
        }
    }

    fn as_frame(&self) -> Frame<'_> {
        Frame {
            index: self.index,
            link_type: self.link_type,
            data: &self.data,
            caplen: self.caplen,
            origlen: self.origlen,
        }
    }
}

enum Job {
    Exit,
    New(OwnedFrame),
}

struct Worker {
    id: usize,
    handler: thread::JoinHandle<(Aggregator, DispatchCounters)>,
}

/// Chain dispatcher running decoders in worker threads
///
/// Frames of the same IPv4 address pair go to the same worker. Each worker
/// fills its own tables, merged into the result when the capture ends.
/// Results are the same as with [`Dispatcher`](crate::Dispatcher).
pub struct ThreadedDispatcher {
    registry: Arc<DecoderRegistry>,
    n_workers: usize,

    local_jobs: Vec<Sender<Job>>,
    workers: Vec<Worker>,

    stats: Aggregator,
    counters: DispatchCounters,
}

impl ThreadedDispatcher {
    /// Create a dispatcher using `num_threads` workers (0 means one per CPU)
    pub fn new(registry: Arc<DecoderRegistry>, config: &Config) -> Self {
        let n_workers = match config.get_usize("num_threads") {
            Some(0) | None => num_cpus::get(),
            Some(n) => n,
        };
        ThreadedDispatcher {
            registry,
            n_workers,
            local_jobs: Vec::new(),
            workers: Vec::new(),
            stats: Aggregator::new(),
            counters: DispatchCounters::default(),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.n_workers
    }

    pub fn into_stats(self) -> Aggregator {
        self.stats
    }
}

impl FrameAnalyzer for ThreadedDispatcher {
    fn init(&mut self) -> Result<(), Error> {
        debug!("starting {} workers", self.n_workers);
        self.local_jobs.reserve(self.n_workers);
        for i in 0..self.n_workers {
            let (sender, receiver) = bounded::<Job>(QUEUE_LEN);
            let registry = Arc::clone(&self.registry);
            let handler = thread::Builder::new()
                .name(format!("worker {i}"))
                .spawn(move || {
                    debug!("worker thread {i} starting");
                    let mut stats = Aggregator::new();
                    let mut counters = DispatchCounters::default();
                    while let Ok(job) = receiver.recv() {
                        match job {
                            Job::Exit => break,
                            Job::New(frame) => {
                                let outcome =
                                    decode_chain(&registry, &frame.as_frame(), &mut stats);
                                counters.add(outcome);
                            }
                        }
                    }
                    debug!("worker thread {i} done: {counters:?}");
                    (stats, counters)
                })?;
            self.local_jobs.push(sender);
            self.workers.push(Worker { id: i, handler });
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let i = fan_out(frame, self.local_jobs.len());
        trace!("frame {} -> worker {}", frame.index, i);
        self.local_jobs[i]
            .send(Job::New(OwnedFrame::new(frame)))
            .map_err(|_| Error::Generic("worker thread exited"))
    }

    fn teardown(&mut self) {
        debug!("main: exit");
        for job in self.local_jobs.iter() {
            // the worker may already be gone, join reports it
            let _ = job.send(Job::Exit);
        }
        for w in self.workers.drain(..) {
            match w.handler.join() {
                Ok((stats, counters)) => {
                    self.stats.merge(stats);
                    self.counters.merge(&counters);
                }
                Err(_) => error!("worker {} panicked, its statistics are lost", w.id),
            }
        }
        self.local_jobs.clear();
        info!("dispatch done: {:?}", self.counters);
    }
}

impl StatsAnalyzer for ThreadedDispatcher {
    fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    fn stats(&self) -> &Aggregator {
        &self.stats
    }

    fn counters(&self) -> DispatchCounters {
        self.counters
    }
}

/// Offset of the IPv4 header, if the frame carries IPv4
fn ipv4_offset(frame: &Frame) -> Option<usize> {
    match frame.link_type {
        Linktype::RAW | Linktype::IPV4 => Some(0),
        _ => {
            let ethertype = frame.data.get(12..14)?;
            if u16::from_be_bytes([ethertype[0], ethertype[1]]) == ETHERTYPE_IPV4 {
                Some(14)
            } else {
                None
            }
        }
    }
}

/// Select a worker from the (unordered) IPv4 address pair
fn fan_out(frame: &Frame, n_workers: usize) -> usize {
    let Some(ip) = ipv4_offset(frame).and_then(|off| frame.data.get(off..off + 20)) else {
        return 0;
    };
    let mut buf = [0u8; 4];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = ip[12 + i] ^ ip[16 + i];
    }
    let mut hasher = FnvHasher::default();
    hasher.write(&buf);
    hasher.finish() as usize % n_workers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::{build_frame, registry};
    use crate::dispatcher::Dispatcher;

    fn frames() -> Vec<Vec<u8>> {
        let mut v = Vec::new();
        for i in 0..50u8 {
            let a = [10, 0, 0, i % 7];
            let b = [10, 0, 1, i % 5];
            let (src, dst) = if i % 2 == 0 { (a, b) } else { (b, a) };
            let proto = if i % 3 == 0 { 17 } else { 6 };
            v.push(build_frame(src, dst, proto, 1000 + (i % 4) as u16, 80, i as usize));
        }
        // not IPv4
        let mut arp = vec![0u8; 42];
        arp[12] = 0x08;
        arp[13] = 0x06;
        v.push(arp);
        v
    }

    #[test]
    fn threaded_matches_sequential() {
        let frames = frames();
        let mut seq = Dispatcher::new(registry());
        for (i, data) in frames.iter().enumerate() {
            seq.handle_frame(&Frame::new(i + 1, Linktype::ETHERNET, data))
                .unwrap();
        }
        seq.teardown();

        let mut config = Config::default();
        config.set("num_threads", 3);
        let mut threaded = ThreadedDispatcher::new(registry(), &config);
        assert_eq!(threaded.num_workers(), 3);
        threaded.init().unwrap();
        for (i, data) in frames.iter().enumerate() {
            threaded
                .handle_frame(&Frame::new(i + 1, Linktype::ETHERNET, data))
                .unwrap();
        }
        threaded.teardown();

        assert_eq!(threaded.counters(), seq.counters());
        assert_eq!(threaded.counters().frames, 51);
        assert_eq!(threaded.stats(), seq.stats());
    }

    #[test]
    fn fan_out_is_symmetric() {
        let f1 = build_frame([192, 168, 0, 1], [8, 8, 8, 8], 17, 5000, 53, 10);
        let f2 = build_frame([8, 8, 8, 8], [192, 168, 0, 1], 17, 53, 5000, 40);
        let w1 = fan_out(&Frame::new(1, Linktype::ETHERNET, &f1), 8);
        let w2 = fan_out(&Frame::new(2, Linktype::ETHERNET, &f2), 8);
        assert_eq!(w1, w2);
        assert!(w1 < 8);
        assert_eq!(fan_out(&Frame::new(3, Linktype::ETHERNET, &[0u8; 10]), 8), 0);
    }
}
