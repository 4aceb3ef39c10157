use std::fs;

use gosling::{ast, diagnostic, lowering, lowering_ctx};
use structopt::StructOpt;

#[derive(StructOpt)]
enum Command {
  Build {
    #[structopt(long, parse(from_os_str))]
    path: std::path::PathBuf,
    /// Dump the emitted LLVM assembly to stderr.
    #[structopt(long)]
    dump: bool,
  },
  Run {
    #[structopt(long, parse(from_os_str))]
    path: std::path::PathBuf,
  },
}

#[derive(StructOpt)]
#[structopt(name = "gosling", about = "Driver for the gosling compiler backend")]
struct Opt {
  #[structopt(subcommand)]
  subcommand: Command,
}

/// The unit manifest describing one package directory.
///
/// The declaration graph itself is produced by the upstream frontend and
/// stored next to the manifest as JSON.
#[derive(Debug, serde::Deserialize)]
struct PackageManifest {
  name: String,
  #[allow(dead_code)]
  version: String,
  /// Whether this unit is the program entry package. A package named `main`
  /// is the entry package even without this flag.
  entry: Option<bool>,
  /// File name of the resolved declaration graph, relative to the package
  /// directory. Defaults to `<name>.ast.json`.
  graph: Option<String>,
  /// Original source file, used to render diagnostics with labels.
  source: Option<String>,
  #[serde(rename = "calling-convention")]
  calling_convention: Option<String>,
}

const PACKAGE_MANIFEST_FILENAME: &str = "gosling.toml";
const OUTPUT_LLVM_IR_FILENAME: &str = "output.ll";
const OUTPUT_OBJECT_FILENAME: &str = "output.o";
const OUTPUT_EXECUTABLE_FILENAME: &str = "output";

fn fetch_package_manifest(
  base_path: &std::path::PathBuf,
) -> Result<PackageManifest, Box<dyn std::error::Error>> {
  if !base_path.exists() || !base_path.is_dir() {
    return Err(
      format!(
        "Package directory `{}` does not exist or is not a directory",
        base_path.display()
      )
      .into(),
    );
  }

  let package_manifest_path = base_path.join(PACKAGE_MANIFEST_FILENAME);

  if !package_manifest_path.exists() || !package_manifest_path.is_file() {
    return Err(
      format!(
        "Package manifest file `{}` does not exist or is not a file",
        package_manifest_path.display()
      )
      .into(),
    );
  }

  let toml_string = fs::read_to_string(package_manifest_path)?;

  Ok(toml::from_str(&toml_string)?)
}

fn load_declaration_graph(
  base_path: &std::path::PathBuf,
  package_manifest: &PackageManifest,
) -> Result<ast::Module, Box<dyn std::error::Error>> {
  let graph_filename = package_manifest
    .graph
    .clone()
    .unwrap_or_else(|| format!("{}.ast.json", package_manifest.name));

  let graph_path = base_path.join(graph_filename);

  let json_string = fs::read_to_string(&graph_path).map_err(|error| {
    format!(
      "Failed to read declaration graph `{}`: {}",
      graph_path.display(),
      error
    )
  })?;

  let module: ast::Module = serde_json::from_str(&json_string).map_err(|error| {
    format!(
      "Failed to parse declaration graph `{}`: {}",
      graph_path.display(),
      error
    )
  })?;

  Ok(module)
}

fn parse_calling_convention(
  package_manifest: &PackageManifest,
) -> Result<lowering_ctx::CallConvention, Box<dyn std::error::Error>> {
  match package_manifest.calling_convention.as_deref() {
    None | Some("fast") => Ok(lowering_ctx::CallConvention::Fast),
    Some("c") => Ok(lowering_ctx::CallConvention::C),
    Some(other) => Err(format!("Unknown calling convention `{}`", other).into()),
  }
}

/// Present fatal lowering diagnostics to the user.
///
/// When the manifest points at the original source file, diagnostics are
/// rendered with source labels; otherwise they are printed plainly.
fn report_diagnostics(
  base_path: &std::path::PathBuf,
  package_manifest: &PackageManifest,
  diagnostics: &[diagnostic::Diagnostic],
) {
  let source_text = package_manifest
    .source
    .as_ref()
    .and_then(|source_filename| fs::read_to_string(base_path.join(source_filename)).ok());

  let Some(source_text) = source_text else {
    for diagnostic in diagnostics {
      println!("[error] {:?}", diagnostic);
    }

    return;
  };

  let mut files = codespan_reporting::files::SimpleFiles::new();

  let file_id = files.add(
    package_manifest.source.clone().unwrap_or_default(),
    source_text,
  );

  let writer = codespan_reporting::term::termcolor::StandardStream::stderr(
    codespan_reporting::term::termcolor::ColorChoice::Auto,
  );

  let config = codespan_reporting::term::Config::default();

  for diagnostic in diagnostics {
    codespan_reporting::term::emit(
      &mut writer.lock(),
      &config,
      &files,
      &diagnostic.report(file_id),
    )
    .ok();
  }
}

fn build(
  base_path: &std::path::PathBuf,
  dump: bool,
) -> Result<String, Box<dyn std::error::Error>> {
  let package_manifest = fetch_package_manifest(base_path)?;
  let module = load_declaration_graph(base_path, &package_manifest)?;

  let options = lowering_ctx::LoweringOptions {
    entry_package: package_manifest.entry.unwrap_or(false),
    calling_convention: parse_calling_convention(&package_manifest)?,
  };

  let llvm_ir_output = match lowering::lower_unit(&module, options) {
    Ok(llvm_ir_output) => llvm_ir_output,
    Err(diagnostics) => {
      report_diagnostics(base_path, &package_manifest, &diagnostics);

      return Err("Encountered irrecoverable errors; aborting build".into());
    }
  };

  if dump {
    eprintln!("{}", llvm_ir_output);
  }

  Ok(llvm_ir_output)
}

fn write_llvm_ir(
  base_path: &std::path::PathBuf,
  contents: String,
) -> Result<(), Box<dyn std::error::Error>> {
  let output_path = base_path.join(OUTPUT_LLVM_IR_FILENAME);

  fs::write(output_path, contents)?;

  Ok(())
}

fn compile_and_link_llvm_ir(
  base_path: &std::path::PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
  let llvm_ir_file_path = base_path.join(OUTPUT_LLVM_IR_FILENAME);

  // Run LLVM's `llc` to compile the output LLVM IR file.
  let llc_output = std::process::Command::new("llc")
    .current_dir(base_path)
    .arg("-filetype=obj")
    .arg("-o")
    .arg(OUTPUT_OBJECT_FILENAME)
    .arg(llvm_ir_file_path.clone())
    .output()?;

  if !llc_output.status.success() {
    return Err(
      format!(
        "Failed to compile LLVM IR file `{}`",
        llvm_ir_file_path.display()
      )
      .into(),
    );
  }

  // Run the system linker to link the object file into an executable.
  let linker_output = std::process::Command::new("gcc")
    .current_dir(base_path)
    .arg("-o")
    .arg(OUTPUT_EXECUTABLE_FILENAME)
    .arg(OUTPUT_OBJECT_FILENAME)
    .output()?;

  if !linker_output.status.success() {
    return Err("Failed to link object file into executable".into());
  }

  Ok(())
}

fn run_output_executable(base_path: &std::path::PathBuf) -> Result<(), Box<dyn std::error::Error>> {
  let executable_file_path = base_path.join(OUTPUT_EXECUTABLE_FILENAME);
  let output = std::process::Command::new(executable_file_path).output()?;

  println!("{}", String::from_utf8_lossy(&output.stdout));
  println!("-- process terminated with {} --", output.status);

  if !output.status.success() {
    return Err("Failed to run executable file".into());
  }

  Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  let opt = Opt::from_args();

  match opt.subcommand {
    Command::Build { path, dump } => {
      let llvm_ir_output = build(&path, dump)?;

      write_llvm_ir(&path, llvm_ir_output)?;
      compile_and_link_llvm_ir(&path)?;
    }
    Command::Run { path } => {
      let llvm_ir_output = build(&path, false)?;

      write_llvm_ir(&path, llvm_ir_output)?;
      compile_and_link_llvm_ir(&path)?;
      run_output_executable(&path)?;
    }
  };

  Ok(())
}
