/*!
Line-oriented manifests.

A frequency manifest lists one center frequency in Hz per line. An output
manifest lists one capture path per line, in the same order as the
frequencies that produced them. Blank lines are ignored in both.
*/

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::Error;

/// Parse one frequency, in Hz.
///
/// Integers are taken as-is. A float that happens to be integral, like
/// `2.4e9`, is accepted too. Anything else is an error.
pub fn parse_frequency(line: &str) -> Result<u64, Error> {
    let s = line.trim();
    if let Ok(hz) = s.parse::<u64>() {
        return Ok(hz);
    }
    match s.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz >= 0.0 && hz.fract() == 0.0 && hz <= u64::MAX as f64 => {
            Ok(hz as u64)
        }
        _ => Err(Error::config(format!("{s:?} is not a frequency in Hz"))),
    }
}

/// Parse the contents of a frequency manifest.
pub fn parse_frequencies(text: &str) -> Result<Vec<u64>, Error> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            parse_frequency(line).map_err(|e| match e {
                Error::Configuration(msg) => Error::config(format!("line {}: {msg}", i + 1)),
                other => other,
            })
        })
        .collect()
}

/// Read a frequency manifest.
pub async fn read_frequencies(path: &Path) -> Result<Vec<u64>, Error> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_frequencies(&text).map_err(|e| match e {
        Error::Configuration(msg) => Error::config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Read an output manifest.
pub async fn read_paths(path: &Path) -> Result<Vec<PathBuf>, Error> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// The output manifest paired with a frequency manifest: its path minus the
/// last four characters (normally the `.txt` extension), plus `_op.txt`.
///
/// `cal/freqs.txt` becomes `cal/freqs_op.txt`.
pub fn output_manifest_path(freq_manifest: &Path) -> PathBuf {
    let s = freq_manifest.to_string_lossy();
    let cut = s
        .char_indices()
        .rev()
        .nth(3)
        .map(|(i, _)| i)
        .unwrap_or(0);
    PathBuf::from(format!("{}_op.txt", &s[..cut]))
}

/// Appends paths to an output manifest, one per line.
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    file: BufWriter<tokio::fs::File>,
    lines: usize,
}

impl ManifestWriter {
    /// Create (or truncate) a manifest.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            path,
            file: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Where this manifest is being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.lines
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Append one path. The line is on disk once this returns.
    pub async fn push(&mut self, entry: &Path) -> Result<(), Error> {
        let line = format!("{}\n", entry.display());
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.file.get_ref().sync_data().await?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and sync the manifest, returning its path.
    pub async fn finish(mut self) -> Result<PathBuf, Error> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies() {
        assert_eq!(parse_frequency("2440000000").unwrap(), 2_440_000_000);
        assert_eq!(parse_frequency(" 915000000 ").unwrap(), 915_000_000);
        assert_eq!(parse_frequency("2.4e9").unwrap(), 2_400_000_000);
        assert_eq!(parse_frequency("2400000000.0").unwrap(), 2_400_000_000);
        assert!(parse_frequency("2.4e9.5").is_err());
        assert!(parse_frequency("915000000.5").is_err());
        assert!(parse_frequency("-1").is_err());
        assert!(parse_frequency("nan").is_err());
        assert!(parse_frequency("abc").is_err());
    }

    #[test]
    fn bad_line_is_named() {
        let err = parse_frequencies("100\n\n200\nabc\n").unwrap_err();
        let Error::Configuration(msg) = err else {
            panic!("wrong error: {err:?}");
        };
        assert!(msg.starts_with("line 4"), "{msg}");
        assert_eq!(parse_frequencies("100\n\n200\n").unwrap(), [100, 200]);
    }

    #[test]
    fn output_manifest_names() {
        assert_eq!(
            output_manifest_path(Path::new("cal/freqs.txt")),
            Path::new("cal/freqs_op.txt")
        );
        assert_eq!(output_manifest_path(Path::new("f.txt")), Path::new("f_op.txt"));
    }

    #[tokio::test]
    async fn writer_and_reader_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out_op.txt");
        let mut w = ManifestWriter::create(&path).await.unwrap();
        assert!(w.is_empty());
        w.push(Path::new("/data/100_step_1_sweeped_tone.dat"))
            .await
            .unwrap();
        w.push(Path::new("/data/200_step_1_sweeped_tone.dat"))
            .await
            .unwrap();
        assert_eq!(w.len(), 2);
        let written = w.finish().await.unwrap();
        assert_eq!(written, path);

        let paths = read_paths(&path).await.unwrap();
        assert_eq!(
            paths,
            [
                PathBuf::from("/data/100_step_1_sweeped_tone.dat"),
                PathBuf::from("/data/200_step_1_sweeped_tone.dat"),
            ]
        );
    }

    #[tokio::test]
    async fn pushed_lines_survive_an_unfinished_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial_op.txt");
        let mut w = ManifestWriter::create(&path).await.unwrap();
        w.push(Path::new("/data/100.dat")).await.unwrap();
        drop(w);
        assert_eq!(
            read_paths(&path).await.unwrap(),
            [PathBuf::from("/data/100.dat")]
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_frequencies(&dir.path().join("nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
