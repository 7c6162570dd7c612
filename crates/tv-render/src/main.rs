//! tvfdn impulse-response renderer
//!
//! Usage:
//!   tv-render --output ir.wav                     - Default settings
//!   tv-render --preset hall --seconds 6 -o ir.wav - Start from a preset
//!   tv-render --config room.json --t60 1.2 -o ir.wav
//!   tv-render --preset hall --dump-config         - Print the resolved configuration

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use tv_core::{MultiChannelBuffer, Sample};
use tv_dsp::analysis::{estimate_t60, mix_down, rms_envelope_db};
use tv_dsp::{FdnConfig, FdnProcessor, ProcessorConfig};

#[derive(Parser, Debug)]
#[command(name = "tv-render", about = "Render the impulse response of a tvfdn reverberator")]
struct Cli {
    /// Output WAV file (32-bit float)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named preset: default, small_room, hall
    #[arg(short, long, conflicts_with = "config")]
    preset: Option<String>,

    /// Number of delay lines (2, 4, 8, 16, 32, 64)
    #[arg(long)]
    order: Option<u32>,

    /// Decay time at DC in seconds
    #[arg(long)]
    t60: Option<f32>,

    /// Nyquist decay time as a fraction of the DC decay time
    #[arg(long)]
    brightness: Option<f32>,

    /// Dry/wet mix
    #[arg(long)]
    mix: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    /// LFO depth in samples
    #[arg(long)]
    modulation_depth: Option<f32>,

    /// LFO rate in Hz
    #[arg(long)]
    modulation_rate: Option<f32>,

    /// Length of the rendered response
    #[arg(short, long, default_value_t = 4.0)]
    seconds: f64,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Host channel count
    #[arg(long, default_value_t = 2)]
    channels: usize,

    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// Write a JSON analysis report next to the audio
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

/// Start from file, preset or defaults, then apply command-line overrides
fn resolve_config(cli: &Cli) -> Result<FdnConfig> {
    let mut config = if let Some(path) = &cli.config {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        FdnConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))?
    } else if let Some(name) = &cli.preset {
        match FdnConfig::preset(name) {
            Some(config) => config,
            None => bail!("unknown preset '{name}' (expected default, small_room or hall)"),
        }
    } else {
        FdnConfig::default()
    };

    if let Some(order) = cli.order {
        config.order = order;
    }
    if let Some(t60) = cli.t60 {
        config.t60 = t60;
    }
    if let Some(brightness) = cli.brightness {
        config.brightness = brightness;
    }
    if let Some(mix) = cli.mix {
        config.mix = mix;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(depth) = cli.modulation_depth {
        config.modulation_depth = depth;
    }
    if let Some(rate) = cli.modulation_rate {
        config.modulation_rate = rate;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Per-channel response to a unit impulse on every channel
fn render_impulse_response(
    config: &FdnConfig,
    channels: usize,
    sample_rate: f64,
    block_size: usize,
    num_samples: usize,
) -> Result<MultiChannelBuffer> {
    let (mut processor, _controls) =
        FdnProcessor::new(config, channels).context("building processor")?;
    processor
        .prepare(sample_rate, block_size)
        .context("preparing processor")?;

    let mut output = MultiChannelBuffer::new(channels, num_samples);
    if num_samples > 0 {
        for c in 0..channels {
            output.channel_mut(c)[0] = 1.0;
        }
    }

    let mut start = 0;
    while start < num_samples {
        let end = (start + block_size).min(num_samples);
        let mut block: Vec<&mut [Sample]> = output
            .channels_mut()
            .into_iter()
            .map(|channel| &mut channel[start..end])
            .collect();
        processor
            .process_block(&mut block)
            .with_context(|| format!("processing samples {start}..{end}"))?;
        start = end;
    }
    Ok(output)
}

fn write_wav(path: &Path, buffer: &MultiChannelBuffer, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for sample in buffer.interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("finalizing WAV")?;
    Ok(())
}

fn mono_sum(buffer: &MultiChannelBuffer) -> Vec<Sample> {
    let views: Vec<&[Sample]> = (0..buffer.num_channels()).map(|c| buffer.channel(c)).collect();
    mix_down(&views)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    if cli.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    if cli.channels == 0 || cli.channels > u16::MAX as usize {
        bail!("channel count must be between 1 and {}", u16::MAX);
    }
    if !(cli.seconds > 0.0 && cli.seconds.is_finite()) {
        bail!("--seconds must be positive");
    }
    let Some(output_path) = &cli.output else {
        bail!("--output is required unless --dump-config is given");
    };

    let sample_rate = cli.sample_rate as f64;
    let num_samples = (cli.seconds * sample_rate).round() as usize;
    info!(
        "Rendering {:.2} s: order {}, T60 {} s, brightness {}, mix {}, seed {}",
        cli.seconds, config.order, config.t60, config.brightness, config.mix, config.seed
    );

    let response = render_impulse_response(&config, cli.channels, sample_rate, cli.block_size, num_samples)?;
    write_wav(output_path, &response, cli.sample_rate)?;
    info!("Wrote {}", output_path.display());

    let mono = mono_sum(&response);
    let estimated = estimate_t60(&mono, sample_rate);
    match estimated {
        Some(t60) => info!("Estimated T60: {t60:.3} s (configured {} s)", config.t60),
        None => info!("Response too short to estimate T60"),
    }

    if let Some(report_path) = &cli.report {
        let envelope = rms_envelope_db(&mono, (sample_rate / 10.0) as usize);
        let report = serde_json::json!({
            "output": output_path.display().to_string(),
            "sample_rate": cli.sample_rate,
            "channels": cli.channels,
            "samples": num_samples,
            "config": config,
            "estimated_t60": estimated,
            "envelope_db_100ms": envelope,
        });
        fs::write(report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report {}", report_path.display()))?;
        info!("Wrote report {}", report_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tv_core::AudioBuffer;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("tv-render").chain(args.iter().copied()))
    }

    #[test]
    fn test_overrides_apply_on_preset() {
        let config = resolve_config(&cli(&["--preset", "hall", "--t60", "1.5", "--seed", "9"])).unwrap();
        assert_eq!(config.order, 32);
        assert_eq!(config.t60, 1.5);
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(resolve_config(&cli(&["--order", "7"])).is_err());
        assert!(resolve_config(&cli(&["--preset", "cathedral"])).is_err());
        assert!(resolve_config(&cli(&["--brightness", "2"])).is_err());
    }

    #[test]
    fn test_render_shape_and_decay() {
        let config = FdnConfig {
            order: 8,
            t60: 0.5,
            brightness: 1.0,
            mix: 1.0,
            ..FdnConfig::default()
        };
        let response = render_impulse_response(&config, 2, 48000.0, 300, 48000).unwrap();
        assert_eq!(response.num_channels(), 2);
        assert_eq!(response.len(), 48000);
        assert!(response.interleaved().iter().all(|x| x.is_finite()));

        let t60 = estimate_t60(&mono_sum(&response), 48000.0).unwrap();
        assert_relative_eq!(t60, 0.5, max_relative = 0.1);
    }
}
