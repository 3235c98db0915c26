//! # FretBoss - Fretboard Trainer CLI
//!
//! Command-line front end for the FretBoss core: listens to the microphone
//! (or a synthetic tone) and names the note being played, and answers note
//! and fretboard questions.
//!
//! Usage:
//!   fretboss listen             - Detect notes from the default input device
//!   fretboss freq A4            - Equal-tempered frequency of a pitch
//!   fretboss transpose E2 7     - Transpose a pitch by semitones
//!   fretboss fret 0 5           - Note at a string/fret position
//!   fretboss find G3            - Every position that plays a pitch

mod meter;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fretboss_core::audio::DEFAULT_SAMPLE_RATE;
use fretboss_core::fft::Window;
use fretboss_core::fretboard::{positions_of, positions_of_class};
use fretboss_core::{
    AnalysisSnapshot, AudioSource, CpalSource, GuitarPosition, Pitch, PitchClass, Recorder,
    SessionConfig, SineSource, SystemClock, Tuning, note_at, transpose,
};

/// Number of readings averaged for the cent needle.
const SMOOTHING_FACTOR: usize = 5;

#[derive(Parser)]
#[command(name = "fretboss", version, about = "Fretboard trainer: pitch detection and note lookup")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the note being played
    Listen(ListenArgs),
    /// Equal-tempered frequency of a pitch (A4 = 440 Hz)
    Freq {
        /// Pitch in scientific notation, e.g. A4, C#3, Bb2
        pitch: Pitch,
    },
    /// Transpose a pitch by a number of semitones
    Transpose {
        pitch: Pitch,
        #[arg(allow_negative_numbers = true)]
        semitones: i32,
    },
    /// Note sounded at a string and fret (string 0 is the low E)
    Fret {
        string: usize,
        fret: usize,
        #[command(flatten)]
        tuning: TuningArg,
    },
    /// Every string/fret position that plays a pitch, or a pitch class in any octave
    Find {
        /// A pitch (G3) or a bare pitch class (G)
        note: String,
        #[command(flatten)]
        tuning: TuningArg,
    },
}

#[derive(Args)]
struct TuningArg {
    /// Open strings from lowest to highest
    #[arg(long, default_value = "E2 A2 D3 G3 B3 E4")]
    tuning: Tuning,
}

#[derive(Args)]
struct ListenArgs {
    /// Stop after this many seconds (runs until interrupted when omitted)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Analyze a synthetic sine at this frequency instead of the microphone
    #[arg(long, value_name = "HZ")]
    synthetic: Option<f64>,

    /// Samples per analysis window (power of two)
    #[arg(short, long, default_value_t = 2048)]
    window: usize,

    /// Milliseconds between analysis ticks
    #[arg(short, long, default_value_t = 100)]
    interval_ms: u64,

    /// Number of fundamentals to report
    #[arg(short, long, default_value_t = 1)]
    peaks: usize,

    /// Apply a Hann window before the transform
    #[arg(long)]
    hann: bool,

    /// Refine peaks with parabolic interpolation
    #[arg(long)]
    interpolate: bool,

    #[command(flatten)]
    tuning: TuningArg,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen(args) => listen(&args, cli.json),
        Commands::Freq { pitch } => freq(pitch, cli.json),
        Commands::Transpose { pitch, semitones } => transpose_pitch(pitch, semitones, cli.json),
        Commands::Fret { string, fret, tuning } => fret_note(string, fret, &tuning.tuning, cli.json),
        Commands::Find { note, tuning } => find(&note, &tuning.tuning, cli.json),
    }
}

fn listen(args: &ListenArgs, json: bool) -> Result<()> {
    let config = SessionConfig {
        window_size: args.window,
        poll_interval_ms: args.interval_ms,
        max_fundamentals: args.peaks,
        window: if args.hann { Window::Hann } else { Window::Rectangular },
        interpolate: args.interpolate,
    };

    let synthetic = args.synthetic;
    let recorder = Recorder::new(config.clone(), Arc::new(SystemClock), move || -> Box<dyn AudioSource> {
        match synthetic {
            Some(hz) => Box::new(SineSource::new(hz, DEFAULT_SAMPLE_RATE)),
            None => Box::new(CpalSource::new(DEFAULT_SAMPLE_RATE)),
        }
    })
    .context("Invalid listen settings")?;

    recorder.start_recording().context("Failed to start recording")?;
    log::info!("Listening (window {}, every {} ms)", config.window_size, config.poll_interval_ms);

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let mut smoothing: VecDeque<f64> = VecDeque::with_capacity(SMOOTHING_FACTOR);
    let mut last_sequence = 0;

    while deadline.is_none_or(|d| Instant::now() < d) {
        if !recorder.is_recording() {
            bail!("Capture stopped unexpectedly: {:?}", recorder.last_error());
        }
        let snapshot = recorder.latest();
        if snapshot.sequence != last_sequence {
            last_sequence = snapshot.sequence;
            if json {
                println!("{}", serde_json::to_string(&*snapshot)?);
            } else {
                print_reading(&snapshot, &mut smoothing, &args.tuning.tuning);
            }
        }
        thread::sleep(config.poll_interval() / 2);
    }

    recorder.stop_recording();
    Ok(())
}

fn print_reading(snapshot: &AnalysisSnapshot, smoothing: &mut VecDeque<f64>, tuning: &Tuning) {
    let Some(nearest) = snapshot.nearest else {
        smoothing.clear();
        println!("{:>6}  {}", "--", meter::cent_meter(None));
        return;
    };

    smoothing.push_back(nearest.cents);
    if smoothing.len() > SMOOTHING_FACTOR {
        smoothing.pop_front();
    }
    let cents = smoothing.iter().sum::<f64>() / smoothing.len() as f64;

    let positions = positions_of(nearest.pitch, tuning)
        .iter()
        .map(|p| format!("{}:{}", p.string, p.fret))
        .collect::<Vec<_>>()
        .join(" ");
    let detected = snapshot.top().map(|e| e.frequency.to_string()).unwrap_or_default();
    println!(
        "{:>6}  {}  {:+6.1} cents  {}  [{}]",
        nearest.pitch.to_string(),
        meter::cent_meter(Some(cents)),
        cents,
        detected,
        positions
    );
}

fn freq(pitch: Pitch, json: bool) -> Result<()> {
    let frequency = pitch.frequency()?;
    if json {
        println!("{}", serde_json::json!({ "pitch": pitch, "frequency": frequency }));
    } else {
        println!("{} = {}", pitch, frequency);
    }
    Ok(())
}

fn transpose_pitch(pitch: Pitch, semitones: i32, json: bool) -> Result<()> {
    let result = transpose(pitch.note, pitch.octave, semitones);
    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{} {:+} = {}", pitch, semitones, result);
    }
    Ok(())
}

fn fret_note(string: usize, fret: usize, tuning: &Tuning, json: bool) -> Result<()> {
    let position = GuitarPosition::new(string, fret)?;
    let pitch = note_at(position, tuning)?;
    if json {
        println!("{}", serde_json::json!({ "position": position, "pitch": pitch }));
    } else {
        println!("string {}, fret {} = {}", string, fret, pitch);
        print!("{}", meter::fretboard_diagram(tuning, &[position]));
    }
    Ok(())
}

fn find(note: &str, tuning: &Tuning, json: bool) -> Result<()> {
    let positions = match note.parse::<Pitch>() {
        Ok(pitch) => positions_of(pitch, tuning),
        Err(_) => {
            let class: PitchClass = note
                .parse()
                .with_context(|| format!("{:?} is neither a pitch nor a pitch class", note))?;
            positions_of_class(class, tuning)
        }
    };

    if json {
        println!("{}", serde_json::to_string(&positions)?);
    } else if positions.is_empty() {
        println!("{} is not on the fretboard in tuning {}", note, tuning);
    } else {
        for p in &positions {
            println!("string {}, fret {}", p.string, p.fret);
        }
        print!("{}", meter::fretboard_diagram(tuning, &positions));
    }
    Ok(())
}
