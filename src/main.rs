use clap::Parser;
use jslt::{codec, Compiler, DirectoryResolver, Expression, Value};
use std::collections::HashMap;
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};

/// Apply a JSLT program to JSON input and print the result.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSLT program file
    program: PathBuf,
    /// JSON input file; reads stdin when omitted
    input: Option<PathBuf>,
    /// Variable visible as $NAME (repeatable)
    #[arg(long = "var", value_name = "NAME=JSON")]
    vars: Vec<String>,
    /// Object filter written in JSLT
    #[arg(long, value_name = "EXPR")]
    filter: Option<String>,
    /// Directory imports are resolved against
    #[arg(long, value_name = "DIR")]
    modules: Option<PathBuf>,
    /// Treat input as a sequence of JSON documents
    #[arg(long)]
    stream: bool,
    /// Print compact output instead of pretty
    #[arg(long)]
    compact: bool,
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_max_level(level).init();

    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut compiler = Compiler::new();
    if let Some(dir) = &args.modules {
        compiler = compiler.resolver(Arc::new(DirectoryResolver::new(dir)));
    }
    if let Some(filter) = &args.filter {
        compiler = compiler.object_filter_expr(filter)?;
    }
    let expr = compiler.compile_file(&args.program)?;
    let variables = parse_vars(&args.vars)?;

    let (text, source) = match &args.input {
        Some(path) => (std::fs::read_to_string(path)?, path.display().to_string()),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            (buf, "<stdin>".to_string())
        }
    };

    if args.stream {
        for (n, doc) in codec::Reader::new(&text).with_source_name(&source).enumerate() {
            debug!(document = n, "applying");
            emit(&expr, &variables, &doc?, args.compact)?;
        }
    } else {
        let mut docs = codec::Reader::new(&text).with_source_name(&source);
        let input = docs.next().transpose()?.unwrap_or_default();
        if docs.next().is_some() {
            return Err(format!("{source}: more than one JSON document; use --stream").into());
        }
        emit(&expr, &variables, &input, args.compact)?;
    }
    Ok(())
}

fn emit(expr: &Expression, variables: &HashMap<String, Value>, input: &Value, compact: bool) -> jslt::Result<()> {
    let out = expr.apply_with(variables, input)?;
    if compact {
        println!("{}", codec::to_string(&out));
    } else {
        println!("{}", codec::to_string_pretty(&out));
    }
    Ok(())
}

fn parse_vars(entries: &[String]) -> Result<HashMap<String, Value>, Box<dyn Error>> {
    let mut vars = HashMap::new();
    for entry in entries {
        let (name, json) = entry
            .split_once('=')
            .ok_or_else(|| format!("--var expects NAME=JSON, got '{entry}'"))?;
        vars.insert(name.to_string(), codec::parse(json)?);
    }
    Ok(vars)
}
