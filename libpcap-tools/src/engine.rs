use crate::analyzer::FrameAnalyzer;
use crate::config::Config;
use crate::error::Error;
use crate::frame::Frame;
use pcap_parser::{Block, Linktype, PcapBlockOwned, PcapError};
use std::cmp::min;
use std::io::Read;

/// Common trait for engines reading a capture source
pub trait CaptureEngine {
    /// Main function: given a reader, read all capture data and analyze every frame
    fn run(&mut self, reader: &mut (dyn Read + Send)) -> Result<(), Error>;
}

/// Capture file engine
///
/// `FrameEngine` iterates over a pcap or pcap-ng input, abstracts the container
/// format (endianness, sections, interfaces) and hands every captured record to
/// a [`FrameAnalyzer`] as a [`Frame`].
///
/// An unrecognized file header is a fatal error. A truncated or corrupted record
/// ends the sequence early: frames read so far stay valid, and the analyzer
/// teardown is still called.
///
/// ## example
///
/// ```
/// use libpcap_tools::{CaptureEngine, Config, Error, Frame, FrameAnalyzer, FrameEngine};
/// #[derive(Default)]
/// pub struct CountingAnalyzer {
///     frames: usize,
/// }
///
/// impl FrameAnalyzer for CountingAnalyzer {
///     fn handle_frame(&mut self, _frame: &Frame) -> Result<(), Error> {
///         self.frames += 1;
///         Ok(())
///     }
/// }
///
/// let config = Config::default();
/// let mut engine = FrameEngine::new(CountingAnalyzer::default(), &config);
///
/// // `engine.run()` can take any `mut Read + Send` as input
/// use std::io::Cursor;
/// let mut input = Cursor::new(vec![1, 2, 3, 4, 5]);
/// assert!(engine.run(&mut input).is_err());
/// ```
pub struct FrameEngine<A: FrameAnalyzer> {
    analyzer: A,
    capacity: usize,
}

impl<A: FrameAnalyzer> FrameEngine<A> {
    pub fn new(analyzer: A, config: &Config) -> Self {
        let capacity = config
            .get_usize("buffer_initial_capacity")
            .unwrap_or(128 * 1024);
        FrameEngine { analyzer, capacity }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut A {
        &mut self.analyzer
    }

    pub fn into_analyzer(self) -> A {
        self.analyzer
    }
}

/// Interface table entry (one per pcap file, or per pcap-ng IDB)
struct InterfaceInfo {
    link_type: Linktype,
}

/// Build a frame from a block, updating the interface table on the way
///
/// Returns `None` for blocks that do not carry packet data.
fn frame_of_block<'a>(
    block: &'a PcapBlockOwned<'_>,
    interfaces: &mut Vec<InterfaceInfo>,
    index: usize,
) -> Option<Frame<'a>> {
    match block {
        PcapBlockOwned::LegacyHeader(ref hdr) => {
            trace!("Legacy pcap, link type: {}", hdr.network);
            interfaces.clear();
            interfaces.push(InterfaceInfo {
                link_type: hdr.network,
            });
            None
        }
        PcapBlockOwned::Legacy(ref b) => {
            let link_type = interfaces
                .first()
                .map_or(Linktype::ETHERNET, |i| i.link_type);
            let data = &b.data[..min(b.caplen as usize, b.data.len())];
            Some(Frame {
                index,
                link_type,
                data,
                caplen: b.caplen,
                origlen: b.origlen,
            })
        }
        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
            // reset section-related variables
            interfaces.clear();
            None
        }
        PcapBlockOwned::NG(Block::InterfaceDescription(ref idb)) => {
            interfaces.push(InterfaceInfo {
                link_type: idb.linktype,
            });
            None
        }
        PcapBlockOwned::NG(Block::EnhancedPacket(ref epb)) => {
            let if_info = match interfaces.get(epb.if_id as usize) {
                Some(if_info) => if_info,
                None => {
                    warn!(
                        "EnhancedPacket references unknown interface {} (idx={})",
                        epb.if_id, index
                    );
                    return None;
                }
            };
            let data = &epb.data[..min(epb.caplen as usize, epb.data.len())];
            Some(Frame {
                index,
                link_type: if_info.link_type,
                data,
                caplen: epb.caplen,
                origlen: epb.origlen,
            })
        }
        PcapBlockOwned::NG(Block::SimplePacket(ref spb)) => {
            let if_info = match interfaces.first() {
                Some(if_info) => if_info,
                None => {
                    warn!("SimplePacket without interface (idx={index})");
                    return None;
                }
            };
            let data = &spb.data[..min(spb.origlen as usize, spb.data.len())];
            Some(Frame {
                index,
                link_type: if_info.link_type,
                data,
                caplen: data.len() as u32,
                origlen: spb.origlen,
            })
        }
        _ => {
            // statistics, name resolution, custom blocks: no packet data
            None
        }
    }
}

impl<A: FrameAnalyzer> CaptureEngine for FrameEngine<A> {
    fn run(&mut self, reader: &mut (dyn Read + Send)) -> Result<(), Error> {
        let mut reader = pcap_parser::create_reader(self.capacity, reader)?;

        self.analyzer.init()?;
        let mut interfaces = Vec::new();
        let mut block_index = 0usize;
        let mut frame_index = 0usize;
        let mut last_incomplete_index = None;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    block_index += 1;
                    if let Some(frame) = frame_of_block(&block, &mut interfaces, frame_index + 1)
                    {
                        frame_index += 1;
                        self.analyzer.handle_frame(&frame)?;
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    if last_incomplete_index == Some(block_index) {
                        warn!("Could not read complete data block (block_index={block_index})");
                        warn!("Hint: the input file may be truncated.");
                        break;
                    }
                    last_incomplete_index = Some(block_index);
                    // refill the buffer
                    trace!("need refill");
                    reader.refill()?;
                }
                Err(e) => {
                    let e = e.to_owned_vec();
                    warn!("error while reading capture (block_index={block_index}): {e:?}");
                    warn!("Stopping after {frame_index} frames");
                    break;
                }
            }
        }

        debug!("capture source exhausted: {frame_index} frames, {block_index} blocks");
        self.analyzer.teardown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(usize, Vec<u8>)>,
        teardown: usize,
    }

    impl FrameAnalyzer for Recorder {
        fn handle_frame(&mut self, frame: &Frame) -> Result<(), Error> {
            self.frames.push((frame.index, frame.data.to_vec()));
            Ok(())
        }

        fn teardown(&mut self) {
            self.teardown += 1;
        }
    }

    fn pcap_header() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&65535u32.to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes());
        v
    }

    fn pcap_record(data: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&1u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&(data.len() as u32).to_le_bytes());
        v.extend_from_slice(&(data.len() as u32).to_le_bytes());
        v.extend_from_slice(data);
        v
    }

    fn run(input: Vec<u8>) -> (Result<(), Error>, Recorder) {
        let mut engine = FrameEngine::new(Recorder::default(), &Config::default());
        let res = engine.run(&mut Cursor::new(input));
        (res, engine.into_analyzer())
    }

    #[test]
    fn engine_reads_frames_in_order() {
        let mut input = pcap_header();
        input.extend(pcap_record(&[1, 2, 3]));
        input.extend(pcap_record(&[4, 5]));
        let (res, rec) = run(input);
        assert!(res.is_ok());
        assert_eq!(rec.frames, vec![(1, vec![1, 2, 3]), (2, vec![4, 5])]);
        assert_eq!(rec.teardown, 1);
    }

    #[test]
    fn engine_empty_capture() {
        let (res, rec) = run(pcap_header());
        assert!(res.is_ok());
        assert!(rec.frames.is_empty());
        assert_eq!(rec.teardown, 1);
    }

    #[test]
    fn engine_truncated_record_ends_early() {
        let mut input = pcap_header();
        input.extend(pcap_record(&[1, 2, 3, 4]));
        let mut last = pcap_record(&[9; 32]);
        last.truncate(24);
        input.extend(last);
        let (res, rec) = run(input);
        assert!(res.is_ok());
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(rec.teardown, 1);
    }

    #[test]
    fn engine_rejects_unknown_header() {
        let (res, rec) = run(vec![0u8; 64]);
        assert!(matches!(res, Err(Error::Pcap(_))));
        assert_eq!(rec.teardown, 0);
    }

    #[test]
    fn engine_reads_boxed_source() {
        let mut input = pcap_header();
        input.extend(pcap_record(&[7, 7]));
        let mut reader: Box<dyn Read + Send> = Box::new(Cursor::new(input));
        let mut engine = FrameEngine::new(Recorder::default(), &Config::default());
        assert!(engine.run(&mut reader).is_ok());
        assert_eq!(engine.analyzer().frames, vec![(1, vec![7, 7])]);
    }
}
