use clap::Parser;
use colored::Colorize;
use simdgen::prelude::*;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simdgen-cli")]
#[command(about = "Compile a math expression into a SIMD kernel and run it")]
#[command(version)]
struct Args {
    /// Expression to compile, e.g. "log(cosh(x))" or "red_sum(x*x)"
    expression: String,

    /// Name of the free variable
    #[arg(long, default_value = "x")]
    var: String,

    /// Print the generated Cranelift IR
    #[arg(long)]
    clif: bool,

    /// Vectors processed per loop iteration (1-4)
    #[arg(long)]
    unroll: Option<usize>,

    /// Input values
    #[arg(allow_negative_numbers = true)]
    values: Vec<f32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("simdgen=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{} {}", "Error:".red().bold(), e.to_string().red());
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    check_variable(&args.var)?;
    let mut options = CompileOptions::from_env()?;
    if let Some(unroll) = args.unroll {
        options = options.with_unroll(unroll);
    }

    if args.clif {
        let program = check(parse(&args.expression, &args.var)?, &args.var)?;
        println!(
            "{}",
            format!("; CLIF IR for '{}' on {}", program, target_lexicon::Triple::host()).dimmed()
        );
        println!("{}", clif_ir(&program, &options)?);
    }

    let kernel = Kernel::compile(&args.expression, &args.var, &options)?;
    println!("{kernel}");

    match kernel.convention() {
        Convention::ElementwiseMap => {
            let mut results = vec![0.0; args.values.len()];
            kernel.apply(&mut results, &args.values)?;
            for (x, y) in args.values.iter().zip(&results) {
                println!("{x} -> {}", y.to_string().green());
            }
        }
        Convention::ReduceSum => {
            let sum = kernel.reduce(&args.values)?;
            println!("{}", sum.to_string().green());
        }
    }

    Ok(())
}
