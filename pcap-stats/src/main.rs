#![warn(clippy::all)]

#[macro_use]
extern crate log;

extern crate clap;
use clap::{crate_version, Parser};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

extern crate flate2;
extern crate lz4;
extern crate xz2;

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use libpcap_stats::decoders::builtin_builders;
use libpcap_stats::*;
use libpcap_tools::{CaptureEngine, FrameEngine};

/// Traffic statistics for pcap files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// List built-in decoders and exit
    #[arg(long)]
    list_decoders: bool,

    /// Reports output directory
    #[arg(short, long)]
    outdir: Option<String>,

    /// Protocol to plugin library mapping file
    #[arg(long, value_name = "FILE")]
    decoder_mapping: Option<String>,

    /// TCP port to protocol mapping file
    #[arg(long, value_name = "FILE")]
    port_mapping: Option<String>,

    /// Number of jobs to run (default: 1, 0 for one per CPU)
    #[arg(short, long)]
    jobs: Option<u8>,

    /// Also write all statistics as JSON
    #[arg(long)]
    json: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Input file (pcap or pcap-ng, optionally compressed), or `-` for stdin
    input: Option<String>,
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), io::Error> {
    debug!("Loading configuration {filename}");
    let path = Path::new(&filename);
    let file = File::open(path)?;
    config.load_config(file)
}

fn open_input(input_filename: &str) -> io::Result<Box<dyn io::Read + Send>> {
    let reader = if input_filename == "-" {
        Box::new(io::stdin())
    } else {
        let path = Path::new(input_filename);
        let file = File::open(path)?;
        if input_filename.ends_with(".gz") {
            Box::new(GzDecoder::new(file))
        } else if input_filename.ends_with(".xz") {
            Box::new(XzDecoder::new(file))
        } else if input_filename.ends_with(".lz4") {
            Box::new(lz4::Decoder::new(file)?)
        } else {
            Box::new(file) as Box<dyn io::Read + Send>
        }
    };
    Ok(reader)
}

/// Decode all frames, then write the reports
fn process<A: StatsAnalyzer>(
    analyzer: A,
    config: &Config,
    reader: &mut (dyn io::Read + Send),
) -> io::Result<()> {
    println!("Processing packets...");
    let start = Instant::now();
    let mut engine = FrameEngine::new(analyzer, config);
    engine.run(reader).map_err(|e| {
        error!("capture processing failed: {e}");
        io::Error::other(e.to_string())
    })?;
    let elapsed = start.elapsed().as_secs_f64();
    let analyzer = engine.into_analyzer();
    println!("Packet processing complete");

    let counters = analyzer.counters();
    println!("Total Packets: {}", counters.frames);
    println!("Elapsed time: {elapsed} seconds");
    if elapsed > 0.0 {
        println!(
            "Processing Speed: {:.0} packets per second",
            counters.frames as f64 / elapsed
        );
    }
    info!(
        "{} frames: {} complete, {} exhausted, {} malformed, {} unresolved",
        counters.frames,
        counters.complete,
        counters.exhausted,
        counters.malformed,
        counters.unresolved
    );

    println!("Generating reports...");
    let sink = ReportSink::new(config);
    let files = sink.write_all(analyzer.stats()).map_err(|e| {
        error!("writing reports failed: {e}");
        io::Error::other(e)
    })?;
    for f in &files {
        debug!("wrote {}", f.display());
    }
    analyzer.registry().generate_plugin_reports();
    println!("Reports written to {}", sink.output_dir().display());
    Ok(())
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    // check if asked to list decoders
    if args.list_decoders {
        println!("pcap-stats built-in decoders:");
        for b in builtin_builders() {
            println!("    {}", b.name());
        }
        ::std::process::exit(0);
    }
    // load config
    let mut config = Config::default();
    if let Some(filename) = args.config {
        load_config(&mut config, &filename)?;
    }
    // override config options from command-line arguments
    if let Some(jobs) = args.jobs {
        config.set("num_threads", jobs);
    }
    if let Some(dir) = args.outdir {
        config.set("output_dir", dir.as_str());
    }
    if let Some(f) = args.decoder_mapping {
        config.set("decoder_mapping", f.as_str());
    }
    if let Some(f) = args.port_mapping {
        config.set("port_mapping", f.as_str());
    }
    if args.json {
        config.set("json_output", true);
    }

    let input_filename = match args.input.as_ref() {
        Some(s) => s.as_str(),
        None => {
            eprintln!("Usage: pcap-stats <pcap_file>");
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "Input file name cannot be empty",
            ));
        }
    };

    // Open log file
    let log_file = config.get("log_file").unwrap_or("pcap-stats.log");
    let output_dir = report::get_output_dir(&config);
    fs::create_dir_all(output_dir)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_file)
        .build(output_dir)
        .map_err(io::Error::other)?;
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let env_filter = EnvFilter::try_from_env("PCAP_STATS_LOG")
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(level.into()));
    tracing_subscriber::fmt()
        .with_writer(file_appender)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .compact()
        .init();

    // Now, really start
    info!("pcap-stats {}", crate_version!());

    println!("Loading PCAP file: {input_filename}...");
    let mut input_reader = open_input(input_filename).map_err(|e| {
        eprintln!("Error: could not open {input_filename}: {e}");
        e
    })?;

    let registry = Arc::new(DecoderRegistry::new(&config));
    debug!("Built-in decoders:");
    registry.iter_builders(|name| debug!("  {name}"));

    let num_threads = config.get_usize("num_threads").unwrap_or(1);
    let res = if num_threads == 1 {
        let analyzer = Dispatcher::new(registry);
        process(analyzer, &config, &mut input_reader)
    } else {
        let analyzer = ThreadedDispatcher::new(registry, &config);
        process(analyzer, &config, &mut input_reader)
    };
    if let Err(e) = res {
        eprintln!("Error: {e}");
        return Err(e);
    }

    info!("pcap-stats: done, exiting");
    Ok(())
}
