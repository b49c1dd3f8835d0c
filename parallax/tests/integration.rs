//! Integration tests for the plx CLI.
//!
//! Everything runs offline against temp-dir models written on the fly.

use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::Array2;
use parallax::cli::{Cli, run_cli};
use parallax_infer::graph::{GraphDef, IoDef, NodeDef, OpKind, SourceModel};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn create_temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("plx-test-{name}"));

    if dir.exists() {
        std::fs::remove_dir_all(&dir).ok();
    }
    std::fs::create_dir_all(&dir).expect("failed to create temp dir");

    dir
}

fn scale_model(name: &str, window: usize, factor: f32) -> SourceModel {
    let graph = GraphDef {
        name: name.to_string(),
        inputs: vec![IoDef {
            name: "x".to_string(),
            shape: vec![1, window],
        }],
        nodes: vec![NodeDef {
            name: "y".to_string(),
            op: OpKind::Scale { factor },
            inputs: vec!["x".to_string()],
        }],
        outputs: vec!["y".to_string()],
    };
    SourceModel::new(graph, BTreeMap::new())
}

fn write_model(model: &SourceModel, path: &Path) {
    std::fs::write(path, model.to_json().expect("serialize model")).expect("write model");
}

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("create wav");
    for &sample in samples {
        writer.write_sample((sample * 32767.0) as i16).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

#[test]
fn convert_writes_artifact_pair_and_is_idempotent() {
    let dir = create_temp_dir("convert");
    let model_path = dir.join("model.json");

    let mut model = scale_model("tiny", 8, 2.0);
    model.weights.insert(
        "w".to_string(),
        Array2::<f32>::from_shape_vec((8, 2), (0..16).map(|i| i as f32).collect())
            .unwrap()
            .into_dyn(),
    );
    model.graph.nodes.push(NodeDef {
        name: "proj".to_string(),
        op: OpKind::MatMul {
            weight: "w".to_string(),
        },
        inputs: vec!["y".to_string()],
    });
    model.graph.outputs = vec!["proj".to_string()];
    write_model(&model, &model_path);

    let args = [
        "plx",
        "convert",
        "--model",
        model_path.to_str().unwrap(),
        "--cache-dir",
        dir.to_str().unwrap(),
        "--base",
        "tiny",
    ];

    run_cli(Cli::parse_from(args)).expect("convert failed");

    let descriptor = dir.join("tiny.graph.json");
    let weights = dir.join("tiny.weights.bin");
    assert!(descriptor.exists());
    assert!(weights.exists());

    let before = std::fs::read(&descriptor).unwrap();
    run_cli(Cli::parse_from(args)).expect("second convert failed");
    assert_eq!(std::fs::read(&descriptor).unwrap(), before);

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn codec_roundtrips_wav_through_scale_pair() {
    let dir = create_temp_dir("codec");

    let enc_path = dir.join("enc.json");
    let dec_path = dir.join("dec.json");
    write_model(&scale_model("enc", 40, 0.5), &enc_path);
    write_model(&scale_model("dec", 40, 2.0), &dec_path);

    let input_path = dir.join("input.wav");
    let samples: Vec<f32> = (0..120).map(|i| ((i as f32) / 120.0) - 0.5).collect();
    write_wav(&input_path, &samples);

    let output_path = dir.join("output.wav");
    let cli = Cli::parse_from([
        "plx",
        "codec",
        "--encoder",
        enc_path.to_str().unwrap(),
        "--decoder",
        dec_path.to_str().unwrap(),
        "--runner",
        "native",
        "--cache-dir",
        dir.to_str().unwrap(),
        input_path.to_str().unwrap(),
        "-o",
        output_path.to_str().unwrap(),
    ]);

    run_cli(cli).expect("codec failed");

    let output = parallax_infer::audio::AudioBuffer::from_wav(&output_path).expect("read output");
    assert_eq!(output.frames(), 120);
    for (a, b) in samples.iter().zip(&output.samples) {
        // one 16-bit quantization round trip of tolerance
        assert!((a - b).abs() < 2.0 / 32767.0, "sample diverged: {a} vs {b}");
    }

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn fetch_returns_cached_file_without_network() {
    let dir = create_temp_dir("fetch");
    std::fs::write(dir.join("sample.wav"), b"cached").unwrap();

    let cli = Cli::parse_from([
        "plx",
        "fetch",
        "http://invalid.invalid/sample.wav",
        "-o",
        dir.to_str().unwrap(),
    ]);

    run_cli(cli).expect("cached fetch should not hit the network");

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn convert_rejects_data_dependent_model() {
    let dir = create_temp_dir("gated");
    let model_path = dir.join("gated.json");

    let mut model = scale_model("gated", 8, 1.0);
    model.graph.nodes.push(NodeDef {
        name: "gate".to_string(),
        op: OpKind::GateOnMean { threshold: 0.0 },
        inputs: vec!["y".to_string()],
    });
    model.graph.outputs = vec!["gate".to_string()];
    write_model(&model, &model_path);

    let cli = Cli::parse_from([
        "plx",
        "convert",
        "--model",
        model_path.to_str().unwrap(),
        "--cache-dir",
        dir.to_str().unwrap(),
    ]);

    assert!(run_cli(cli).is_err());
    assert!(!dir.join("gated.graph.json").exists());

    std::fs::remove_dir_all(dir).ok();
}
