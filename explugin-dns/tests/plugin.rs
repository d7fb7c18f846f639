use std::collections::HashMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use libpcap_stats::{
    ChainOutcome, Config, Decoder, DecoderRegistry, Dispatcher, Frame, Linktype, ProtocolId,
    ResolveError, StatsAnalyzer,
};

const QUERY: &[u8] = &[
    0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, b'w', b'w', b'w',
    0x00, 0x00, 0x01, 0x00, 0x01,
];

/// Shared library built from this crate, next to the test executable
fn plugin_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let prefix = format!("{}explugin_dns", DLL_PREFIX);
    for dir in [deps, deps.parent().unwrap()] {
        let path = dir.join(format!("{}{}", prefix, DLL_SUFFIX));
        if path.exists() {
            return path;
        }
    }
    fs::read_dir(deps)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name.starts_with(&prefix) && name.ends_with(DLL_SUFFIX)
        })
        .expect("explugin-dns shared library")
}

/// Ethernet/IPv4/UDP frame to port 53 carrying `payload`
fn dns_frame(payload: &[u8]) -> Vec<u8> {
    let total = 28 + payload.len();
    let mut v = vec![0u8; 42];
    v[12] = 0x08;
    v[14] = 0x45;
    v[16..18].copy_from_slice(&(total as u16).to_be_bytes());
    v[22] = 64;
    v[23] = 17;
    v[26..30].copy_from_slice(&[192, 168, 1, 10]);
    v[30..34].copy_from_slice(&[192, 168, 1, 1]);
    v[34..36].copy_from_slice(&51000u16.to_be_bytes());
    v[36..38].copy_from_slice(&53u16.to_be_bytes());
    v[38..40].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    v.extend_from_slice(payload);
    v
}

fn registry_with(protocol: &str, library: PathBuf) -> Arc<DecoderRegistry> {
    let mut config = Config::default();
    config.set("port_mapping", "/nonexistent/tcp-port-mapping.dat");
    let mut mapping = HashMap::new();
    mapping.insert(protocol.to_owned(), library);
    Arc::new(DecoderRegistry::with_mapping(&config, mapping))
}

#[test]
fn dns_plugin_decodes_and_reports() {
    let registry = registry_with("DNS", plugin_library());
    assert!(registry.loaded_plugins().is_empty());

    let data = dns_frame(QUERY);
    let mut dispatcher = Dispatcher::new(Arc::clone(&registry));
    for index in 1..=2 {
        let outcome = dispatcher.dispatch(&Frame::new(index, Linktype::ETHERNET, &data));
        assert_eq!(outcome, ChainOutcome::Complete);
    }
    assert_eq!(dispatcher.counters().complete, 2);
    assert_eq!(dispatcher.stats().udp.total_bytes, 2 * QUERY.len() as u64);

    // later lookups reuse the loaded library
    let decoder = registry.resolve(&ProtocolId::from(ProtocolId::DNS)).unwrap();
    assert_eq!(decoder.name(), "DNS");
    assert_eq!(registry.loaded_plugins(), vec!["DNS".to_owned()]);

    // the plugin writes its report in the current directory
    let mut dir = std::env::temp_dir();
    dir.push(format!("explugin-dns-plugin-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    std::env::set_current_dir(&dir).unwrap();
    registry.generate_plugin_reports();
    let summary = fs::read_to_string(dir.join("output-dns-csv-files/dns-summary.csv")).unwrap();
    assert_eq!(
        summary,
        "#messages,queries,responses,questions,answers,noError,nxDomain,otherErrors\n\
         2,2,0,2,0,0,0,0\n"
    );
    fs::remove_dir_all(&dir).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn library_without_entry_points() {
    let registry = registry_with("X", PathBuf::from("libm.so.6"));
    let res = registry.resolve(&ProtocolId::from("X"));
    assert!(matches!(
        res,
        Err(ResolveError::MissingEntryPoint {
            symbol: "create_decoder",
            ..
        })
    ));
    assert!(registry.loaded_plugins().is_empty());
    // the failure is remembered
    assert!(matches!(
        registry.resolve(&ProtocolId::from("X")),
        Err(ResolveError::PreviouslyFailed(_))
    ));
}
