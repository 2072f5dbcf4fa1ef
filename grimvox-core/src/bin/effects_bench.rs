fn main() {
    if let Err(e) = run() {
        eprintln!("effects bench failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use grimvox_core::audio::read_wav;
    use grimvox_core::effects::{EffectChain, EffectChainConfig};
    use serde::Serialize;
    use std::path::{Path, PathBuf};
    use std::time::Instant;

    #[derive(Debug)]
    struct Args {
        fixtures_dir: PathBuf,
        iterations: usize,
        chain: Option<PathBuf>,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct CaseResult {
        file: String,
        iteration: usize,
        audio_secs: f64,
        latency_ms: f64,
        /// Processing time over audio time; below 1.0 keeps up with playback.
        real_time_factor: f64,
        output_peak: f32,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        fixtures_dir: String,
        stages: Vec<&'static str>,
        iterations: usize,
        total_runs: usize,
        total_files: usize,
        p50_latency_ms: f64,
        p95_latency_ms: f64,
        avg_real_time_factor: f64,
        max_output_peak: f32,
        cases: Vec<CaseResult>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut fixtures_dir: Option<PathBuf> = None;
        let mut iterations: usize = 1;
        let mut chain: Option<PathBuf> = None;
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--fixtures" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --fixtures".into());
                    };
                    fixtures_dir = Some(PathBuf::from(v));
                }
                "--iterations" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --iterations".into());
                    };
                    iterations = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 20);
                }
                "--chain" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --chain".into());
                    };
                    chain = Some(PathBuf::from(v));
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p grimvox-core --release --bin effects_bench -- \\
  --fixtures <dir> [--iterations <n>] [--chain <chain.json>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        Ok(Args {
            fixtures_dir: fixtures_dir.unwrap_or_else(|| PathBuf::from("benchmarks/fixtures")),
            iterations,
            chain,
            output,
        })
    }

    fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
        let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
        for entry in entries {
            let path = entry.map_err(|e| e.to_string())?.path();
            if path.is_dir() {
                collect_wavs(&path, out)?;
                continue;
            }
            let is_wav = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("wav"));
            if is_wav {
                out.push(path);
            }
        }
        Ok(())
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    let args = parse_args()?;
    let config = match &args.chain {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str::<EffectChainConfig>(&raw).map_err(|e| e.to_string())?
        }
        None => EffectChainConfig::default(),
    };
    let mut chain = EffectChain::from_config(&config).map_err(|e| e.to_string())?;

    let mut wav_files = Vec::new();
    collect_wavs(&args.fixtures_dir, &mut wav_files)
        .map_err(|e| format!("{}: {e}", args.fixtures_dir.display()))?;
    wav_files.sort();
    if wav_files.is_empty() {
        return Err(format!(
            "no .wav fixtures found in {}",
            args.fixtures_dir.display()
        ));
    }

    println!(
        "Running effect chain [{}] on {} fixtures (iterations={})",
        chain.stage_names().join(" → "),
        wav_files.len(),
        args.iterations
    );

    let mut cases = Vec::new();
    for wav in &wav_files {
        let input = read_wav(wav).map_err(|e| format!("{}: {e}", wav.display()))?;
        let file = wav
            .strip_prefix(&args.fixtures_dir)
            .unwrap_or(wav)
            .display()
            .to_string();
        let audio_secs = input.duration_secs();

        for iteration in 1..=args.iterations {
            chain.reset();
            let started = Instant::now();
            let rendered = chain.process(&input);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let real_time_factor = if audio_secs > 0.0 {
                latency_ms / 1000.0 / audio_secs
            } else {
                0.0
            };
            println!(
                "{file} [{iteration}/{}] {latency_ms:.1} ms rtf={real_time_factor:.3}",
                args.iterations
            );
            cases.push(CaseResult {
                file: file.clone(),
                iteration,
                audio_secs,
                latency_ms,
                real_time_factor,
                output_peak: rendered.peak(),
            });
        }
    }

    let latencies = cases.iter().map(|c| c.latency_ms).collect::<Vec<_>>();
    let summary = Summary {
        fixtures_dir: args.fixtures_dir.display().to_string(),
        stages: chain.stage_names(),
        iterations: args.iterations,
        total_runs: cases.len(),
        total_files: wav_files.len(),
        p50_latency_ms: percentile(&latencies, 0.50),
        p95_latency_ms: percentile(&latencies, 0.95),
        avg_real_time_factor: if cases.is_empty() {
            0.0
        } else {
            cases.iter().map(|c| c.real_time_factor).sum::<f64>() / cases.len() as f64
        },
        max_output_peak: cases.iter().map(|c| c.output_peak).fold(0.0, f32::max),
        cases,
    };

    println!(
        "Done. runs={} p50={:.1}ms p95={:.1}ms rtf={:.3}",
        summary.total_runs,
        summary.p50_latency_ms,
        summary.p95_latency_ms,
        summary.avg_real_time_factor
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote effects report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
