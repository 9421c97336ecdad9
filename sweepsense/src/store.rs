/*!
Saving and loading [`Config`] records as TOML.

A save writes to a temporary file in the target's directory, syncs it, and
renames it over the target, so a reader never sees a half-written record.
Only the raw configuration is stored; derived values are recomputed by
resolving it again after loading.
*/

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{Config, Error};

/// Save a configuration to its own `self_name`, returning the path written.
///
/// The saved file is read back and logged so the operator can check it.
pub fn save(config: &Config) -> Result<PathBuf, Error> {
    if config.self_name.is_empty() {
        return Err(Error::config("can't save a configuration with an empty self_name"));
    }
    let path = PathBuf::from(&config.self_name);
    save_to(config, &path)?;

    let saved = load(&path)?;
    info!("Saved configuration to {}", path.display());
    info!("{saved:#?}");
    Ok(path)
}

/// Save a configuration to an explicit path.
pub fn save_to(config: &Config, path: &Path) -> Result<(), Error> {
    let text = toml::to_string_pretty(config)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Load a configuration.
///
/// A missing file, truncated contents, unknown fields, or wrongly-typed values
/// all come back as [`Error::Deserialization`].
pub fn load(path: &Path) -> Result<Config, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::deserialization(path, e))?;
    toml::from_str(&text).map_err(|e| Error::deserialization(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dir: &Path) -> Config {
        Config {
            band1: 0xffff_ffff,
            band2: 0x1f,
            step: 3,
            maxsamp: 123_456,
            skip: 7,
            in_n: 5,
            mode: 3,
            rf_div: 2,
            rgain: 12.5,
            tgain: 0.0,
            samp: 20e6,
            txfreq: 5.8e9,
            txsamp: 1e6,
            filename: vec!["rx.dat".into(), "cal.dat".into()],
            self_name: dir.join("opts.toml").display().to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = sample(dir.path());
        let path = save(&cfg).unwrap();
        assert_eq!(load(&path).unwrap(), cfg);

        // Overwriting leaves only the new record.
        let mut cfg2 = cfg.clone();
        cfg2.mode = 30;
        cfg2.filename.truncate(1);
        save(&cfg2).unwrap();
        assert_eq!(load(&path).unwrap(), cfg2);
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn empty_self_name() {
        let cfg = Config::default();
        assert!(matches!(save(&cfg), Err(Error::Configuration(_))));
    }

    #[test]
    fn load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(load(&missing), Err(Error::Deserialization { .. })));

        let cfg = sample(dir.path());
        let path = save(&cfg).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        std::fs::write(&path, &text[..text.len() / 3]).unwrap();
        assert!(matches!(load(&path), Err(Error::Deserialization { .. })));

        std::fs::write(&path, format!("{text}\nbogus = 1\n")).unwrap();
        assert!(matches!(load(&path), Err(Error::Deserialization { .. })));

        std::fs::write(&path, text.replace("step = 3", "step = \"three\"")).unwrap();
        assert!(matches!(load(&path), Err(Error::Deserialization { .. })));
    }
}
