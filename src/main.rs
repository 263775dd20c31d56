use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::process;

use getopts::Options;
use indicatif::{ProgressBar, ProgressStyle};
use regex::bytes::Regex;

use rdbscope::escape::Escape;
use rdbscope::formatter::{JustKeyVals, JustKeys, Plain, Protocol, JSON};
use rdbscope::memory::{Architecture, CsvReport, MemoryProfiler, RedisVersion};
use rdbscope::reader::ReadProgressBar;
use rdbscope::{Filter, Formatter, RdbParser, StrictFilter, Type};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!(
        "Usage: {} [options] dump.rdb\n\n\
         Example: {} --command json --key \"user.*\" dump.rdb",
        program, program
    );
    eprint!("{}", opts.usage(&brief));
}

fn fail(program: &str, opts: &Options, message: &str) -> ! {
    eprintln!("{}: {}", program, message);
    print_usage(program, opts);
    process::exit(1);
}

fn output_writer(path: Option<&str>) -> io::Result<Box<dyn Write + 'static>> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(io::stdout())),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt(
        "c",
        "command",
        "one of json, diff, justkeys, justkeyvals, memory, protocol",
        "CMD",
    );
    opts.optopt("f", "file", "write output to a file instead of stdout", "FILE");
    opts.optmulti("n", "db", "only process this database (repeatable)", "N");
    opts.optopt("k", "key", "only process keys matching this regex", "REGEX");
    opts.optopt("", "not-key", "skip keys matching this regex", "REGEX");
    opts.optmulti(
        "t",
        "type",
        "only process keys of this type: string, list, set, sortedset, hash, stream, module (repeatable)",
        "TYPE",
    );
    opts.optopt("b", "bytes", "memory: only report keys of at least N bytes", "N");
    opts.optopt("l", "largest", "memory: only report the N largest keys", "N");
    opts.optopt("e", "escape", "one of raw, print, utf8, base64", "ESCAPE");
    opts.optflag("", "no-expire", "protocol: do not emit EXPIREAT commands");
    opts.optopt(
        "a",
        "amend-expire",
        "protocol: add N seconds to every expiration",
        "N",
    );
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(err) => fail(&program, &opts, &err.to_string()),
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return;
    }

    let dump_file = match matches.free.first() {
        Some(path) => path.clone(),
        None => fail(&program, &opts, "no dump file specified"),
    };

    let escape = match matches.opt_str("e") {
        None => Escape::Raw,
        Some(name) => match Escape::from_name(&name) {
            Some(escape) => escape,
            None => fail(&program, &opts, &format!("unknown escape '{}'", name)),
        },
    };

    let mut filter = StrictFilter::new();
    for db in matches.opt_strs("n") {
        match db.parse() {
            Ok(db) => filter.add_database(db),
            Err(_) => fail(&program, &opts, &format!("invalid database '{}'", db)),
        }
    }
    for name in matches.opt_strs("t") {
        match Type::from_name(&name) {
            Some(typ) => filter.add_type(typ),
            None => fail(&program, &opts, &format!("unknown type '{}'", name)),
        }
    }
    if let Some(pattern) = matches.opt_str("k") {
        match Regex::new(&pattern) {
            Ok(re) => filter.add_keys(re),
            Err(err) => fail(&program, &opts, &format!("invalid key regex: {}", err)),
        }
    }
    if let Some(pattern) = matches.opt_str("not-key") {
        match Regex::new(&pattern) {
            Ok(re) => filter.add_not_keys(re),
            Err(err) => fail(&program, &opts, &format!("invalid not-key regex: {}", err)),
        }
    }

    let file = match File::open(Path::new(&dump_file)) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("{}: cannot open {}: {}", program, dump_file, err);
            process::exit(1);
        }
    };
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);

    let progress_bar = ProgressBar::new(file_size);
    progress_bar.set_style(
        ProgressStyle::default_bar().template("{bar:40} {bytes}/{total_bytes} ({eta})"),
    );
    let reader = ReadProgressBar::new(BufReader::new(file), progress_bar.clone());

    let out = match output_writer(matches.opt_str("f").as_deref()) {
        Ok(out) => out,
        Err(err) => {
            eprintln!("{}: cannot open output file: {}", program, err);
            process::exit(1);
        }
    };

    let command = matches.opt_str("c").unwrap_or_else(|| "json".to_string());
    let result = match command.as_str() {
        "json" => run(reader, JSON::with_writer(out, escape), filter),
        "diff" => run(reader, Plain::with_writer(out, escape), filter),
        "justkeys" => run(reader, JustKeys::with_writer(out, escape), filter),
        "justkeyvals" => run(reader, JustKeyVals::with_writer(out, escape), filter),
        "protocol" => {
            let mut formatter = Protocol::with_writer(out);
            if matches.opt_present("no-expire") {
                formatter = formatter.no_expire();
            }
            if let Some(amend) = matches.opt_str("a") {
                match amend.parse() {
                    Ok(seconds) => formatter = formatter.amend_expire(seconds),
                    Err(_) => fail(&program, &opts, &format!("invalid amend-expire '{}'", amend)),
                }
            }
            run(reader, formatter, filter)
        }
        "memory" => {
            let mut report = CsvReport::with_writer(out);
            if let Some(bytes) = matches.opt_str("b") {
                match bytes.parse() {
                    Ok(bytes) => report = report.min_bytes(bytes),
                    Err(_) => fail(&program, &opts, &format!("invalid bytes '{}'", bytes)),
                }
            }
            if let Some(largest) = matches.opt_str("l") {
                match largest.parse() {
                    Ok(largest) => report = report.largest(largest),
                    Err(_) => fail(&program, &opts, &format!("invalid largest '{}'", largest)),
                }
            }
            let mut profiler =
                MemoryProfiler::new(report, Architecture::Bits64, RedisVersion::new(5, 0));
            profiler.set_escape(escape);
            run(reader, profiler, filter)
        }
        other => fail(&program, &opts, &format!("unknown command '{}'", other)),
    };

    progress_bar.finish_and_clear();

    if let Err(err) = result {
        eprintln!("{}: {}", program, err);
        process::exit(1);
    }
}

fn run<R, F, L>(reader: R, formatter: F, filter: L) -> rdbscope::RdbOk
where
    R: io::Read,
    F: Formatter,
    L: Filter,
{
    let mut parser = RdbParser::new(reader, formatter, filter);
    parser.parse()
}
