use pcap_parser::Linktype;

/// One captured record, borrowed from the capture reader buffer
///
/// `data` is already trimmed to the captured length, so `data.len()` is the
/// frame length seen by decoders.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// Index of the record in the capture file, starting at 1
    pub index: usize,
    /// Data link type of the interface the record was captured on
    pub link_type: Linktype,
    pub data: &'a [u8],
    pub caplen: u32,
    pub origlen: u32,
}

impl<'a> Frame<'a> {
    /// Build a frame from raw bytes, for ex. when replaying buffered data
    pub fn new(index: usize, link_type: Linktype, data: &'a [u8]) -> Self {
        let len = data.len() as u32;
        Frame {
            index,
            link_type,
            data,
            caplen: len,
            origlen: len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
