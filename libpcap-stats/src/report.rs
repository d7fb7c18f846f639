//! CSV and JSON reports

use crate::error::ReportError;
use crate::stats::{Aggregator, IpStats, TrafficCounters, TransportStats};
use libpcap_tools::Config;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Get the base prefix of output directory (or "." if not specified)
pub fn get_output_dir(config: &Config) -> &str {
    config.get("output_dir").unwrap_or(".")
}

/// Create a file to output data, creating `subdir` if needed
pub fn create_file<P: AsRef<str>>(
    base: &Path,
    subdir: &str,
    filename: P,
) -> Result<(PathBuf, File), io::Error> {
    let mut path = base.join(subdir);
    fs::create_dir_all(&path)?;
    path.push(filename.as_ref());
    let file = File::create(&path)?;
    Ok((path, file))
}

fn counters_record(c: &TrafficCounters) -> [String; 4] {
    [
        c.packets_in.to_string(),
        c.packets_out.to_string(),
        c.bytes_in.to_string(),
        c.bytes_out.to_string(),
    ]
}

/// Writes the statistics tables of a run
pub struct ReportSink {
    base: PathBuf,
    json: bool,
}

impl ReportSink {
    pub fn new(config: &Config) -> Self {
        ReportSink {
            base: PathBuf::from(get_output_dir(config)),
            json: config.get_bool("json_output").unwrap_or(false),
        }
    }

    pub fn with_output_dir<P: Into<PathBuf>>(base: P) -> Self {
        ReportSink {
            base: base.into(),
            json: false,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.base
    }

    /// Write all reports, returning the list of created files
    pub fn write_all(&self, stats: &Aggregator) -> Result<Vec<PathBuf>, ReportError> {
        let mut files = self.write_ip(&stats.ip)?;
        files.extend(self.write_transport("tcp", &stats.tcp)?);
        files.extend(self.write_transport("udp", &stats.udp)?);
        if self.json {
            files.push(self.write_json(stats)?);
        }
        Ok(files)
    }

    fn writer(&self, subdir: &str, name: &str) -> Result<(PathBuf, csv::Writer<File>), ReportError> {
        let (path, file) = create_file(&self.base, subdir, name)?;
        debug!("writing {:?}", path);
        Ok((path, csv::Writer::from_writer(file)))
    }

    fn write_summary(
        &self,
        subdir: &str,
        name: &str,
        header: [&str; 4],
        values: [u64; 4],
    ) -> Result<PathBuf, ReportError> {
        let (path, mut wtr) = self.writer(subdir, name)?;
        wtr.write_record(header)?;
        wtr.write_record(values.iter().map(|v| v.to_string()))?;
        wtr.flush()?;
        Ok(path)
    }

    pub fn write_ip(&self, ip: &IpStats) -> Result<Vec<PathBuf>, ReportError> {
        const DIR: &str = "output-ip-csv-files";
        let mut files = Vec::with_capacity(3);

        let (path, mut wtr) = self.writer(DIR, "ip-individual-stats.csv")?;
        wtr.write_record(["ipAddress", "packetsIn", "packetsOut", "bytesIn", "bytesOut"])?;
        for (addr, c) in &ip.individual {
            let [pi, po, bi, bo] = counters_record(c);
            wtr.write_record([addr.to_string(), pi, po, bi, bo])?;
        }
        wtr.flush()?;
        files.push(path);

        let (path, mut wtr) = self.writer(DIR, "ip-interaction-stats.csv")?;
        wtr.write_record(["addr1", "addr2", "packetsIn", "packetsOut", "bytesIn", "bytesOut"])?;
        for ((a1, a2), c) in &ip.interactions {
            let [pi, po, bi, bo] = counters_record(c);
            wtr.write_record([a1.to_string(), a2.to_string(), pi, po, bi, bo])?;
        }
        wtr.flush()?;
        files.push(path);

        files.push(self.write_summary(
            DIR,
            "ip-general-summary.csv",
            ["#packets", "bytes", "#unique-ips", "uniqueInteractions"],
            [
                ip.total_packets,
                ip.total_bytes,
                ip.individual.len() as u64,
                ip.interactions.len() as u64,
            ],
        )?);
        Ok(files)
    }

    /// Write the reports of one transport protocol (`"tcp"` or `"udp"`)
    pub fn write_transport(
        &self,
        proto: &str,
        stats: &TransportStats,
    ) -> Result<Vec<PathBuf>, ReportError> {
        let dir = format!("output-{proto}-csv-files");
        let mut files = Vec::with_capacity(3);

        let (path, mut wtr) = self.writer(&dir, &format!("{proto}-port-stats.csv"))?;
        wtr.write_record(["unique-port", "packetsIn", "packetsOut", "bytesIn", "bytesOut"])?;
        for (port, c) in &stats.ports {
            let [pi, po, bi, bo] = counters_record(c);
            wtr.write_record([port.to_string(), pi, po, bi, bo])?;
        }
        wtr.flush()?;
        files.push(path);

        let (path, mut wtr) = self.writer(&dir, &format!("{proto}-connection-stats.csv"))?;
        wtr.write_record([
            "ip1",
            "ip2",
            "srcPort",
            "destPort",
            "packetsIn",
            "packetsOut",
            "bytesIn",
            "bytesOut",
        ])?;
        for ((p1, p2), entry) in &stats.connections {
            let (ip1, ip2) = entry
                .addresses
                .map(|(a1, a2)| (a1.to_string(), a2.to_string()))
                .unwrap_or_default();
            let [pi, po, bi, bo] = counters_record(&entry.counters);
            wtr.write_record([ip1, ip2, p1.to_string(), p2.to_string(), pi, po, bi, bo])?;
        }
        wtr.flush()?;
        files.push(path);

        files.push(self.write_summary(
            &dir,
            &format!("{proto}-general-summary.csv"),
            ["#packets", "bytes", "#unique-ports", "uniqueConnections"],
            [
                stats.total_packets,
                stats.total_bytes,
                stats.ports.len() as u64,
                stats.connections.len() as u64,
            ],
        )?);
        Ok(files)
    }

    /// Write all tables to `traffic-stats.json`
    pub fn write_json(&self, stats: &Aggregator) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.base)?;
        let path = self.base.join("traffic-stats.json");
        let mut file = File::create(&path)?;
        serde_json::to_writer_pretty(&mut file, &stats.to_json())?;
        writeln!(file)?;
        Ok(path)
    }
}
