//! Stand-in for the video renderer.
//!
//! Accepts the same flags the service passes to the real pipeline, prints the
//! same phase lines, and writes a small placeholder file at `--output-path`.
//! Extra flags make it misbehave on purpose.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sim_renderer", about = "Placeholder avatar renderer")]
struct Args {
    #[arg(long)]
    prompt: String,

    #[arg(long)]
    output_path: PathBuf,

    #[arg(long, default_value_t = 512)]
    height: u32,

    #[arg(long, default_value_t = 512)]
    width: u32,

    #[arg(long, default_value_t = 121)]
    num_frames: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Conditioning image: PATH FRAME STRENGTH.
    #[arg(long, num_args = 3, value_names = ["PATH", "FRAME", "STRENGTH"])]
    image: Option<Vec<String>>,

    /// Exit with this code after the first phase.
    #[arg(long)]
    fail_with: Option<u8>,

    /// Exit successfully without writing the output file.
    #[arg(long)]
    skip_output: bool,

    /// Pause after each phase line.
    #[arg(long, default_value_t = 20)]
    step_ms: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let step = Duration::from_millis(args.step_ms);

    if let Some(image) = &args.image {
        let path = PathBuf::from(&image[0]);
        if !path.is_file() {
            eprintln!("error: conditioning image {} does not exist", path.display());
            return ExitCode::from(2);
        }
        println!("Conditioning frame {} on {} (strength {})", image[1], path.display(), image[2]);
    }

    println!("Loading checkpoint (seed {})", args.seed);
    std::thread::sleep(step);

    if let Some(code) = args.fail_with {
        eprintln!("error: simulated renderer failure");
        return ExitCode::from(code);
    }

    println!(
        "Stage 1: Generating video latents {}x{}, {} frames",
        args.width / 2,
        args.height / 2,
        args.num_frames
    );
    std::thread::sleep(step);
    // The real pipeline logs upscaling on stderr.
    eprintln!("Stage 2: Upscaling 2x to {}x{}", args.width, args.height);
    std::thread::sleep(step);

    if args.skip_output {
        println!("Done (no output written)");
        return ExitCode::SUCCESS;
    }

    let placeholder = format!(
        "sim-render\nprompt={}\nsize={}x{}\nframes={}\nseed={}\n",
        args.prompt, args.width, args.height, args.num_frames, args.seed
    );
    if let Err(e) = std::fs::write(&args.output_path, placeholder) {
        eprintln!("error: failed to write {}: {e}", args.output_path.display());
        return ExitCode::from(1);
    }
    println!("Saved {}", args.output_path.display());
    ExitCode::SUCCESS
}
