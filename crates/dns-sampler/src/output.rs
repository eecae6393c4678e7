use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use dns_core::{DnsError, ErrorInfo, LikelihoodValue};
use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::level::Level;

const LEVELS_HEADER: &str = "index,log_x,log_likelihood,tiebreaker,accepts,tries,exceeds,visits";
const SAMPLE_INFO_HEADER: &str = "save,particle,level,log_likelihood,tiebreaker";

/// Bookkeeping record of one saved particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Zero-based save number.
    pub save: usize,
    /// Index of the particle that was saved.
    pub particle: usize,
    /// Level the particle was assigned to when saved.
    pub level: usize,
    /// Likelihood of the particle when saved.
    pub likelihood: LikelihoodValue,
}

/// Resolved locations of every file a run writes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFiles {
    /// Root directory of the run.
    pub run_directory: PathBuf,
    /// Level table.
    pub levels: PathBuf,
    /// Saved particle states, one JSON document per line.
    pub sample: PathBuf,
    /// Saved particle bookkeeping.
    pub sample_info: PathBuf,
    /// Engine checkpoint.
    pub checkpoint: PathBuf,
    /// Run manifest.
    pub manifest: PathBuf,
}

impl OutputFiles {
    /// Resolves every file name against the run directory.
    pub fn resolve(config: &OutputConfig) -> Self {
        Self {
            run_directory: config.run_directory.clone(),
            levels: config.path_of(&config.levels_file),
            sample: config.path_of(&config.sample_file),
            sample_info: config.path_of(&config.sample_info_file),
            checkpoint: config.path_of(&config.checkpoint_file),
            manifest: config.path_of(&config.manifest_file),
        }
    }

    /// Creates the run directory and truncates sample output from earlier
    /// runs.
    pub fn initialise(&self) -> Result<(), DnsError> {
        fs::create_dir_all(&self.run_directory)
            .map_err(|err| DnsError::io("output-mkdir", &self.run_directory, err))?;
        for path in [&self.sample, &self.sample_info] {
            File::create(path).map_err(|err| DnsError::io("output-truncate", path, err))?;
        }
        Ok(())
    }

    /// Rewrites the level table.
    pub fn write_levels(&self, levels: &[Level]) -> Result<(), DnsError> {
        let mut file =
            File::create(&self.levels).map_err(|err| DnsError::io("levels-create", &self.levels, err))?;
        let mut body = String::with_capacity(64 * (levels.len() + 1));
        body.push_str(LEVELS_HEADER);
        body.push('\n');
        for (index, level) in levels.iter().enumerate() {
            let threshold = level.threshold();
            body.push_str(&format!(
                "{},{:.12e},{:.12e},{:.12},{},{},{},{}\n",
                index,
                level.log_x,
                threshold.log_l(),
                threshold.tiebreak(),
                level.accepts,
                level.tries,
                level.exceeds,
                level.visits
            ));
        }
        file.write_all(body.as_bytes())
            .map_err(|err| DnsError::io("levels-write", &self.levels, err))
    }

    /// Appends one saved particle to the sample files.
    pub fn append_sample<M: Serialize>(&self, info: &SampleInfo, model: &M) -> Result<(), DnsError> {
        let json = serde_json::to_string(model).map_err(|err| {
            DnsError::Serde(
                ErrorInfo::new("sample-serialize", err.to_string())
                    .with_context("save", info.save.to_string()),
            )
        })?;
        append_line(&self.sample, None, &json)?;
        let row = format!(
            "{},{},{},{:.12e},{:.12}",
            info.save,
            info.particle,
            info.level,
            info.likelihood.log_l(),
            info.likelihood.tiebreak()
        );
        append_line(&self.sample_info, Some(SAMPLE_INFO_HEADER), &row)
    }
}

fn append_line(path: &Path, header: Option<&str>, line: &str) -> Result<(), DnsError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| DnsError::io("sample-open", path, err))?;
    let empty = file
        .metadata()
        .map_err(|err| DnsError::io("sample-metadata", path, err))?
        .len()
        == 0;
    if let (true, Some(header)) = (empty, header) {
        writeln!(file, "{header}").map_err(|err| DnsError::io("sample-write", path, err))?;
    }
    writeln!(file, "{line}").map_err(|err| DnsError::io("sample-write", path, err))
}

/// Reads back a level table written by [`OutputFiles::write_levels`].
pub fn read_levels(path: &Path) -> Result<Vec<Level>, DnsError> {
    let contents = fs::read_to_string(path).map_err(|err| DnsError::io("levels-read", path, err))?;
    let parse_err = |line: usize, what: &str| {
        DnsError::Serde(
            ErrorInfo::new("levels-parse", format!("malformed {what}"))
                .with_context("path", path.display().to_string())
                .with_context("line", line.to_string()),
        )
    };
    let mut levels = Vec::new();
    for (number, line) in contents.lines().enumerate().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 8 {
            return Err(parse_err(number + 1, "row"));
        }
        let float = |idx: usize| fields[idx].parse::<f64>().map_err(|_| parse_err(number + 1, "float"));
        let count = |idx: usize| fields[idx].parse::<u64>().map_err(|_| parse_err(number + 1, "count"));
        let mut level = Level::new(LikelihoodValue::new(float(2)?, float(3)?));
        level.log_x = float(1)?;
        level.accepts = count(4)?;
        level.tries = count(5)?;
        level.exceeds = count(6)?;
        level.visits = count(7)?;
        levels.push(level);
    }
    Ok(levels)
}

/// Reads back the bookkeeping rows written by [`OutputFiles::append_sample`].
pub fn read_sample_info(path: &Path) -> Result<Vec<SampleInfo>, DnsError> {
    let contents =
        fs::read_to_string(path).map_err(|err| DnsError::io("sample-info-read", path, err))?;
    let parse_err = |line: usize| {
        DnsError::Serde(
            ErrorInfo::new("sample-info-parse", "malformed sample row")
                .with_context("path", path.display().to_string())
                .with_context("line", line.to_string()),
        )
    };
    let mut rows = Vec::new();
    for (number, line) in contents.lines().enumerate().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        let [save, particle, level, log_l, tiebreak] = fields[..] else {
            return Err(parse_err(number + 1));
        };
        let index = |field: &str| field.parse::<usize>().map_err(|_| parse_err(number + 1));
        let float = |field: &str| field.parse::<f64>().map_err(|_| parse_err(number + 1));
        rows.push(SampleInfo {
            save: index(save)?,
            particle: index(particle)?,
            level: index(level)?,
            likelihood: LikelihoodValue::new(float(log_l)?, float(tiebreak)?),
        });
    }
    Ok(rows)
}
