//! `wfs`: format, check/compact, and mount WFS images.
//!
//! Dispatches on its first argument, since this crate ships one binary with
//! three named subcommands (`format`, `check`, `mount`).

mod gateway;

use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::exit;

use wfs_core::{compact, Device, Error, Filesystem, LogStore};

/// Command line arguments, parsed by hand.
struct Args {
	prog: String,
	command: Option<String>,
	rest: Vec<String>,
}

fn parse_args() -> Args {
	let mut iter = env::args();
	let prog = iter.next().unwrap_or_else(|| "wfs".to_owned());
	let rest: Vec<String> = iter.collect();
	let command = rest.first().cloned();
	let rest = rest.into_iter().skip(1).collect();
	Args { prog, command, rest }
}

fn print_usage(bin: &str) {
	eprintln!("Usage:");
	eprintln!(" {bin} format <image>");
	eprintln!(" {bin} check <image>");
	eprintln!(" {bin} mount <image> <mountpoint> [-o option,...]");
}

fn open_device(prog: &str, path: &Path) -> Device {
	let file = OpenOptions::new()
		.read(true)
		.write(true)
		.open(path)
		.unwrap_or_else(|e| {
			eprintln!("{prog}: {}: {e}", path.display());
			exit(1);
		});
	Device::new(file)
}

fn die(prog: &str, image: &Path, e: Error) -> ! {
	eprintln!("{prog}: {}: {e}", image.display());
	exit(1);
}

fn cmd_format(prog: &str, args: &[String]) {
	let [image] = args else {
		print_usage(prog);
		exit(1);
	};
	let image = PathBuf::from(image);
	let device = open_device(prog, &image);
	if let Err(e) = LogStore::format(device) {
		die(prog, &image, e);
	}
}

fn cmd_check(prog: &str, args: &[String]) {
	let [image] = args else {
		print_usage(prog);
		exit(1);
	};
	let image = PathBuf::from(image);
	let device = open_device(prog, &image);
	let mut store = LogStore::open(device).unwrap_or_else(|e| die(prog, &image, e));
	let report = compact(&mut store).unwrap_or_else(|e| die(prog, &image, e));
	println!(
		"kept {} entries, reclaimed {} bytes",
		report.entries_kept, report.bytes_reclaimed
	);
}

/// Parses `-o a,b,c`-style mount flags into `fuser::MountOption`s. Anything
/// `fuser` doesn't recognize as a named option is forwarded verbatim as a
/// custom option, the same way the kernel would pass it to libfuse.
fn parse_mount_options(args: &[String]) -> Vec<fuser::MountOption> {
	let mut options = vec![fuser::MountOption::FSName("wfs".to_owned())];
	let mut iter = args.iter();
	while let Some(arg) = iter.next() {
		if arg == "-o" {
			if let Some(flags) = iter.next() {
				for flag in flags.split(',') {
					options.push(match flag {
						"ro" => fuser::MountOption::RO,
						"rw" => fuser::MountOption::RW,
						"allow_other" => fuser::MountOption::AllowOther,
						"allow_root" => fuser::MountOption::AllowRoot,
						"auto_unmount" => fuser::MountOption::AutoUnmount,
						"default_permissions" => fuser::MountOption::DefaultPermissions,
						other => fuser::MountOption::CUSTOM(other.to_owned()),
					});
				}
			}
		}
	}
	options
}

fn cmd_mount(prog: &str, args: &[String]) {
	if args.len() < 2 {
		print_usage(prog);
		exit(1);
	}
	let image = PathBuf::from(&args[0]);
	let mountpoint = PathBuf::from(&args[1]);
	let options = parse_mount_options(&args[2..]);

	let device = open_device(prog, &image);
	let store = LogStore::open(device).unwrap_or_else(|e| die(prog, &image, e));
	let fs = gateway::WfsFuse::new(Filesystem::new(store));

	if let Err(e) = fuser::mount2(fs, &mountpoint, &options) {
		eprintln!("{prog}: {}: {e}", mountpoint.display());
		exit(1);
	}
}

fn main() {
	env_logger::init();
	let args = parse_args();

	match args.command.as_deref() {
		Some("format") => cmd_format(&args.prog, &args.rest),
		Some("check") => cmd_check(&args.prog, &args.rest),
		Some("mount") => cmd_mount(&args.prog, &args.rest),
		Some("-h") | Some("--help") | None => {
			print_usage(&args.prog);
			exit(if args.command.is_none() { 1 } else { 0 });
		}
		Some(other) => {
			eprintln!("{}: unknown command `{other}`", args.prog);
			print_usage(&args.prog);
			exit(1);
		}
	}
}
