//! Observed time series and their loading from delimited text.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("could not read observation table")]
    Csv(#[from] csv::Error),
    #[error("could not open observation file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("column `{0}` not found in observation table")]
    MissingColumn(String),
    #[error("line {line}: cannot parse `{value}` in column `{column}` as a number")]
    Parse {
        line: usize,
        column: String,
        value: String,
    },
    #[error("line {line}: observation time {time} must be finite, non-negative and after the previous one")]
    InvalidTime { line: usize, time: f64 },
    #[error("line {line}: value {value} in column `{column}` must be finite and non-negative")]
    InvalidValue {
        line: usize,
        column: String,
        value: f64,
    },
    #[error("channel `{channel}` has {found} values but there are {expected} observation times")]
    LengthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },
    #[error("the observation table contains no rows")]
    Empty,
}

/// Observed quantities at a strictly increasing sequence of times.
///
/// Every channel has one optional value per time; `None` marks a missing
/// measurement. Values are finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    times: Vec<f64>,
    channels: Vec<String>,
    // row-major, one row per time
    values: Vec<Option<f64>>,
}

impl Observations {
    pub fn new(
        times: Vec<f64>,
        channels: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self, DataError> {
        if times.is_empty() {
            return Err(DataError::Empty);
        }
        for (row, &time) in times.iter().enumerate() {
            let increasing = row == 0 || time > times[row - 1];
            if !time.is_finite() || time < 0. || !increasing {
                return Err(DataError::InvalidTime {
                    line: row + 1,
                    time,
                });
            }
        }
        for (name, column) in channels.iter() {
            if column.len() != times.len() {
                return Err(DataError::LengthMismatch {
                    channel: name.clone(),
                    expected: times.len(),
                    found: column.len(),
                });
            }
            if let Some((row, value)) = column
                .iter()
                .enumerate()
                .filter_map(|(row, value)| value.map(|v| (row, v)))
                .find(|(_, v)| !v.is_finite() || *v < 0.)
            {
                return Err(DataError::InvalidValue {
                    line: row + 1,
                    column: name.clone(),
                    value,
                });
            }
        }

        let n_channels = channels.len();
        let mut values = vec![None; times.len() * n_channels];
        for (channel, (_, column)) in channels.iter().enumerate() {
            for (row, value) in column.iter().enumerate() {
                values[row * n_channels + channel] = *value;
            }
        }

        Ok(Self {
            times,
            channels: channels.into_iter().map(|(name, _)| name).collect(),
            values,
        })
    }

    /// Read a table with a header row. Empty cells and `NA` are missing values.
    pub fn from_csv_reader<R: io::Read>(
        reader: R,
        time_column: &str,
        channels: &[&str],
    ) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataError::MissingColumn(name.to_string()))
        };
        let time_pos = position(time_column)?;
        let channel_pos = channels
            .iter()
            .map(|&name| position(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut times = Vec::new();
        let mut columns = vec![Vec::new(); channels.len()];

        for (idx, record) in reader.records().enumerate() {
            // header is line 1
            let line = idx + 2;
            let record = record?;
            let time = parse_cell(record.get(time_pos), line, time_column)?.ok_or_else(|| {
                DataError::Parse {
                    line,
                    column: time_column.to_string(),
                    value: String::new(),
                }
            })?;
            if !time.is_finite() || time < 0. || times.last().is_some_and(|&last| time <= last) {
                return Err(DataError::InvalidTime { line, time });
            }
            times.push(time);
            for (column, (&pos, &name)) in columns.iter_mut().zip(channel_pos.iter().zip(channels)) {
                let value = parse_cell(record.get(pos), line, name)?;
                if let Some(value) = value {
                    if !value.is_finite() || value < 0. {
                        return Err(DataError::InvalidValue {
                            line,
                            column: name.to_string(),
                            value,
                        });
                    }
                }
                column.push(value);
            }
        }

        Self::new(
            times,
            channels
                .iter()
                .map(|name| name.to_string())
                .zip(columns)
                .collect(),
        )
    }

    pub fn from_csv_path<P: AsRef<Path>>(
        path: P,
        time_column: &str,
        channels: &[&str],
    ) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file, time_column, channels)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, channel: usize) -> Option<f64> {
        self.values[row * self.channels.len() + channel]
    }

    /// Values of one channel over time.
    pub fn column(&self, channel: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        assert!(channel < self.channels.len());
        self.values
            .iter()
            .skip(channel)
            .step_by(self.channels.len())
            .copied()
    }
}

fn parse_cell(cell: Option<&str>, line: usize, column: &str) -> Result<Option<f64>, DataError> {
    match cell {
        None | Some("") | Some("NA") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| DataError::Parse {
                line,
                column: column.to_string(),
                value: text.to_string(),
            }),
    }
}
