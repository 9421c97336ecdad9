use sweepsense::{
    Calibration, CalibrationMode, Config, Error, Mode, StepTable, capture, combine,
    device::DeviceCommand,
    flowgraph::Block,
    manifest,
    sim::{SimDriver, SimRuntime},
    store,
};

const STEPS: &str = "step,samp_sep\n1,0\n2,400\n3,200\n";

fn steps() -> StepTable {
    StepTable::from_reader(STEPS.as_bytes()).unwrap()
}

#[tokio::test]
async fn saved_config_captures_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sweep.dat");
    let cfg = Config {
        band1: 0b111,
        band2: 0,
        step: 3,
        maxsamp: 5_000,
        skip: 1_000,
        in_n: 3,
        mode: 30,
        filename: vec![out.display().to_string()],
        self_name: dir.path().join("opts.toml").display().to_string(),
        ..Config::default()
    };
    let saved = store::save(&cfg).unwrap();
    let loaded = store::load(&saved).unwrap();
    assert_eq!(loaded, cfg);

    let resolved = steps().resolve(&loaded).unwrap();
    assert_eq!(resolved, steps().resolve(&cfg).unwrap());
    // 3 bands of 200 samples
    assert_eq!(resolved.period(), 600);
    assert_eq!(resolved.maxsamp(), 5_400);
    assert_eq!(resolved.skip(), 1_200);

    let mut driver = SimDriver::new("CBX-120");
    let mut runtime = SimRuntime::new();
    let report = capture(&resolved, &mut driver, &mut runtime).await.unwrap();
    assert_eq!(
        report.mode,
        Mode::StandaloneUncompensated {
            sweepsense_rx: out.clone()
        }
    );
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 5_400 * 8);
    assert!(runtime.graphs()[0].blocks().contains(&Block::KeepMInN {
        m: 600,
        n: 1_800,
        offset: 0
    }));
}

#[test]
fn uncharacterised_step_is_rejected() {
    let cfg = Config {
        step: 1,
        mode: 30,
        ..Config::default()
    };
    let err = steps().resolve(&cfg).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let cfg = Config { step: 9, ..cfg };
    assert!(matches!(steps().resolve(&cfg), Err(Error::Configuration(_))));
}

#[tokio::test]
async fn sbx_ignores_configured_bands() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        band1: 0xff00,
        band2: 0x3,
        step: 2,
        mode: 30,
        filename: vec![dir.path().join("x.dat").display().to_string()],
        ..Config::default()
    };
    let resolved = steps().resolve(&cfg).unwrap();
    let mut driver = SimDriver::new("SBX-120");
    let mut runtime = SimRuntime::new();
    capture(&resolved, &mut driver, &mut runtime).await.unwrap();

    let cmds = driver.journal().commands;
    assert!(cmds.contains(&DeviceCommand::SetUserRegister {
        addr: 1,
        value: 0x30,
        mboard: 0
    }));
    assert!(cmds.contains(&DeviceCommand::SetUserRegister {
        addr: 2,
        value: 0,
        mboard: 0
    }));
}

#[tokio::test]
async fn calibration_then_standalone_capture() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    let freqs = d.join("freq_list.txt");
    std::fs::write(&freqs, "2400000000\n2.42e9\n\n2440000000\n").unwrap();
    let save = format!("{}/", d.display());

    let cfg = Config {
        band1: 0x30,
        step: 3,
        maxsamp: 1_000,
        skip: 0,
        in_n: 2,
        mode: 1,
        filename: vec![freqs.display().to_string(), save],
        ..Config::default()
    };
    let resolved = steps().resolve(&cfg).unwrap();

    let mut driver = SimDriver::new("CBX");
    let mut runtime = SimRuntime::new();
    let report = Calibration::new(&resolved)
        .run(&mut driver, &mut runtime)
        .await
        .unwrap();
    assert_eq!(report.mode, CalibrationMode::SelfLeakage);
    assert_eq!(report.captures.len(), 3);
    assert_eq!(
        report.captures[1],
        d.join("2420000000_step_3_sweeped_tone.dat")
    );
    assert_eq!(
        manifest::read_paths(&d.join("freq_list_op.txt"))
            .await
            .unwrap(),
        report.captures
    );

    // Only the captures, both manifests and the combined file remain.
    let cal = d.join("combined_rt_cal.dat");
    assert_eq!(report.combined.output, cal);
    let mut names: Vec<String> = std::fs::read_dir(d)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        [
            "2400000000_step_3_sweeped_tone.dat",
            "2420000000_step_3_sweeped_tone.dat",
            "2440000000_step_3_sweeped_tone.dat",
            "combined_rt_cal.dat",
            "freq_list.txt",
            "freq_list_op.txt",
        ]
    );
    // One period: 2 bands of 200 samples.
    assert_eq!(std::fs::metadata(&cal).unwrap().len(), 400 * 8);

    // The combined file compensates a standalone capture.
    let rx = d.join("rx.dat");
    let capture_cfg = Config {
        mode: 3,
        filename: vec![rx.display().to_string(), cal.display().to_string()],
        ..cfg
    };
    let resolved = steps().resolve(&capture_cfg).unwrap();
    capture(&resolved, &mut driver, &mut runtime).await.unwrap();
    assert!(rx.exists());
}

#[tokio::test]
async fn recombining_an_existing_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    let mut listing = String::new();
    for name in ["100.dat", "200.dat", "300.dat"] {
        std::fs::write(d.join(name), [0u8; 64]).unwrap();
        listing.push_str(&format!("{}\n", d.join(name).display()));
    }
    let list = d.join("caps_op.txt");
    std::fs::write(&list, listing).unwrap();

    let cfg = Config {
        band1: 0x1,
        step: 2,
        ..Config::default()
    };
    let resolved = steps().resolve(&cfg).unwrap();
    let mut runtime = SimRuntime::new();
    let out = d.join("cal.dat");
    let report = combine(&resolved, &list, &out, &mut runtime).await.unwrap();
    assert_eq!(report.inputs.len(), 3);
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 400 * 8);
    assert!(!d.join("cal_temp.dat").exists());
    assert!(!d.join("cal_combined.dat").exists());
}
