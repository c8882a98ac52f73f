use std::fs;
use std::path::Path;

use na_seq::Element;
use tempfile::tempdir;
use xyz_reformat::{DirectoryOptions, HeaderLayout, load_folder, process_directory, process_file};

const META: &str = "0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 -0.52 17 -0.49 19 -0.47 21 -0.50 23 -0.46 25 -0.48 27 0.31 29 0.33 31 0.32 33 -0.61";

fn write_text(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}

fn water_dimer_block() -> String {
    format!(
        "6\n{META}\n\
O 0.000 0.000 0.000\n\
H 0.957 0.000 0.000\n\
H -0.240 0.927 0.000\n\
O 2.900 0.000 0.000\n\
H 3.200 0.900 0.000\n\
H 3.200 -0.500 0.700\n"
    )
}

#[test]
fn process_file_writes_sibling_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nenci.000.xyz");
    write_text(&input, &format!("{}{}", water_dimer_block(), water_dimer_block()));

    let report = process_file(&input, None, &HeaderLayout::nenci_2021()).unwrap();
    assert_eq!(report.output, dir.path().join("nenci.000_reformat.xyz"));
    assert_eq!(report.summary.blocks_written, 2);
    assert!(report.summary.is_clean());

    let out = fs::read_to_string(&report.output).unwrap();
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("6"));
    assert_eq!(
        lines.next(),
        Some(
            "CCSD(T)/CBS=-0.52 CCSD(T)/haTZ=-0.49 MP2/haTZ=-0.47 MP2/CBS=-0.50 MP2/aTZ=-0.46 \
MP2/aQZ=-0.48 HF/haTZ=0.31 HF/aTZ=0.33 HF/aQZ=0.32 SAPT2+/aDZTot=-0.61 \
Properties=species:S:1:pos:R:3"
        )
    );
    assert_eq!(lines.next(), Some("O 0.000 0.000 0.000"));
    assert_eq!(out.lines().count(), 16);

    // The input is untouched and no partial file remains.
    assert!(fs::read_to_string(&input).unwrap().starts_with("6\n0 1 2"));
    assert!(!dir.path().join("nenci.000_reformat.xyz.partial").exists());
}

#[test]
fn empty_file_gives_empty_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("empty.xyz");
    write_text(&input, "");

    let report = process_file(&input, None, &HeaderLayout::nenci_2021()).unwrap();
    assert_eq!(report.summary.blocks_written, 0);
    assert_eq!(report.summary.to_string(), "0 blocks written");
    assert_eq!(fs::read_to_string(report.output).unwrap(), "");
}

#[test]
fn missing_input_is_an_error() {
    let dir = tempdir().unwrap();
    let result = process_file(&dir.path().join("nope.xyz"), None, &HeaderLayout::nenci_2021());
    assert!(result.is_err());
    assert!(!dir.path().join("nope_reformat.xyz.partial").exists());
}

#[test]
fn directory_pass_filters_and_skips_outputs() {
    let dir = tempdir().unwrap();
    write_text(&dir.path().join("a.xyz"), &water_dimer_block());
    write_text(&dir.path().join("b.xyz"), &water_dimer_block());
    write_text(&dir.path().join("notes.txt"), "not a data file\n");
    write_text(&dir.path().join("old_reformat.xyz"), "stale\n");
    fs::create_dir(dir.path().join("sub.xyz")).unwrap();

    let options = DirectoryOptions {
        patterns: vec![".xyz".to_owned()],
        ..Default::default()
    };
    let outcomes = process_directory(dir.path(), &options, &HeaderLayout::nenci_2021()).unwrap();

    let inputs: Vec<_> = outcomes
        .iter()
        .map(|o| o.input.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(inputs, vec!["a.xyz", "b.xyz"]);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert!(dir.path().join("a_reformat.xyz").exists());
    assert!(!dir.path().join("notes_reformat.txt").exists());

    // Running again sees the same inputs; outputs are never treated as inputs.
    let again = process_directory(dir.path(), &options, &HeaderLayout::nenci_2021()).unwrap();
    assert_eq!(again.len(), 2);
    assert!(!dir.path().join("a_reformat_reformat.xyz").exists());
}

#[test]
fn one_failing_file_does_not_stop_the_rest() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("out");
    write_text(&dir.path().join("a.xyz"), &water_dimer_block());
    write_text(&dir.path().join("b.xyz"), &water_dimer_block());
    write_text(&dir.path().join("c.xyz"), &water_dimer_block());

    // A directory where b's output should go makes the final rename fail.
    fs::create_dir_all(out_dir.join("b_reformat.xyz").join("blocker")).unwrap();

    let options = DirectoryOptions {
        out_dir: Some(out_dir.clone()),
        ..Default::default()
    };
    let outcomes = process_directory(dir.path(), &options, &HeaderLayout::nenci_2021()).unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_ok());
    assert!(out_dir.join("a_reformat.xyz").is_file());
    assert!(out_dir.join("c_reformat.xyz").is_file());
    assert!(!out_dir.join("b_reformat.xyz.partial").exists());
}

#[test]
fn parallel_matches_sequential() {
    let dir = tempdir().unwrap();
    for i in 0..8 {
        let mut text = String::new();
        for _ in 0..=i {
            text.push_str(&water_dimer_block());
        }
        write_text(&dir.path().join(format!("set.{i:03}.xyz")), &text);
    }

    let seq_dir = dir.path().join("seq");
    let par_dir = dir.path().join("par");
    let layout = HeaderLayout::nenci_2021();

    let seq = process_directory(
        dir.path(),
        &DirectoryOptions {
            out_dir: Some(seq_dir.clone()),
            ..Default::default()
        },
        &layout,
    )
    .unwrap();
    let par = process_directory(
        dir.path(),
        &DirectoryOptions {
            out_dir: Some(par_dir.clone()),
            parallel: true,
            ..Default::default()
        },
        &layout,
    )
    .unwrap();

    assert_eq!(seq.len(), 8);
    assert_eq!(par.len(), 8);
    for (s, p) in seq.iter().zip(&par) {
        assert_eq!(s.input, p.input);
        let s = s.result.as_ref().unwrap();
        let p = p.result.as_ref().unwrap();
        assert_eq!(s.summary, p.summary);
        assert_eq!(
            fs::read_to_string(&s.output).unwrap(),
            fs::read_to_string(&p.output).unwrap()
        );
    }
    let last = seq[7].result.as_ref().unwrap();
    assert_eq!(last.summary.blocks_written, 8);
}

#[test]
fn custom_layout_from_toml() {
    let dir = tempdir().unwrap();
    let layout_path = dir.path().join("layout.toml");
    write_text(
        &layout_path,
        "indices = [16, 18]\nlabels = [\"energy\", \"energy_mp2\"]\nmarker = \"Properties=species:S:1:pos:R:3\"\n",
    );
    let layout = HeaderLayout::load(&layout_path).unwrap();

    let input = dir.path().join("short.dat");
    write_text(
        &input,
        "1\n0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 -1.5 17 -1.25\nHe 0 0 0\n",
    );
    let report = process_file(&input, None, &layout).unwrap();
    let out = fs::read_to_string(report.output).unwrap();
    assert_eq!(
        out,
        "1\nenergy=-1.5 energy_mp2=-1.25 Properties=species:S:1:pos:R:3\nHe 0 0 0\n"
    );
}

#[test]
fn reformatted_output_loads_as_extxyz() {
    let dir = tempdir().unwrap();
    write_text(
        &dir.path().join("dimers.001.xyz"),
        &format!("{}\n{}", water_dimer_block(), water_dimer_block()),
    );
    write_text(&dir.path().join("dimers.002.xyz"), &water_dimer_block());

    let outcomes = process_directory(
        dir.path(),
        &DirectoryOptions::default(),
        &HeaderLayout::nenci_2021(),
    )
    .unwrap();
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    let frames = load_folder(
        dir.path(),
        "*reformat.xyz",
        &[Element::Hydrogen, Element::Carbon, Element::Oxygen],
    )
    .unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].name.as_deref(), Some("dimers.001_reformat"));
    assert_eq!(frames[2].name.as_deref(), Some("dimers.002_reformat"));
    assert_eq!(frames[0].atoms.len(), 6);
    assert_eq!(frames[0].atoms[0].element, Element::Oxygen);
    assert_eq!(frames[0].info_f64("CCSD(T)/CBS"), Some(-0.52));
    assert_eq!(frames[1].info_f64("SAPT2+/aDZTot"), Some(-0.61));

    // Oxygen isn't allowed here.
    let err = load_folder(dir.path(), "*reformat.xyz", &[Element::Hydrogen]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
