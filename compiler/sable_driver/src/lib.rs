//! Compilation pipeline entry point
//!
//! `compile` runs the whole core for each source file independently:
//! lex → parse → analyze → lower → SSA → validate. Units never share
//! tokens, ASTs, symbol tables or IL; only the final diagnostics are
//! merged. A host may compile separate modules concurrently as long as it
//! hands each compilation its own inputs.

use sable_common::{Diagnostics, Severity};
use sable_il::{lower_program, run_ssa, validate_module, ValidationResult, ValidatorConfig};
use sable_lexer::Lexer;
use sable_parser::{Parser, Program};
use sable_sema::{Analysis, Analyzer, AnalyzerOptions};
use serde::{Deserialize, Serialize};

/// Chip/platform selector. Only the C64 backend exists; the enum leaves
/// room for the other 65xx machines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[default]
    C64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptLevel {
    O0,
    #[default]
    O1,
    O2,
    O3,
    Os,
    Oz,
}

/// Debug-info emission mode, consumed by codegen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugInfo {
    #[default]
    None,
    Inline,
    Vice,
    Both,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Prg,
    Asm,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    pub target: Target,
    pub optimization: OptLevel,
    pub debug: DebugInfo,
    pub output_format: OutputFormat,
    pub load_address: u16,
    pub verbose: bool,
    /// Warnings fail the build.
    pub strict: bool,
    /// Gates the CFG and call-graph passes.
    pub run_advanced_analysis: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            optimization: OptLevel::default(),
            debug: DebugInfo::default(),
            output_format: OutputFormat::default(),
            // BASIC start: the conventional C64 program origin.
            load_address: 0x0801,
            verbose: false,
            strict: false,
            run_advanced_analysis: true,
        }
    }
}

/// One compiled source file.
#[derive(Debug)]
pub struct CompiledUnit {
    pub path: String,
    pub ast: Program,
    pub analysis: Analysis,
    pub il: sable_il::Module,
    pub validation: ValidationResult,
}

/// The result of compiling a set of sources.
#[derive(Debug)]
pub struct CompileOutput {
    pub units: Vec<CompiledUnit>,
    pub diagnostics: Diagnostics,
    pub success: bool,
}

/// Compile every (path, text) pair through the full core pipeline.
pub fn compile(sources: &[(String, String)], options: &CompileOptions) -> CompileOutput {
    let mut diagnostics = Diagnostics::new();
    let mut units = Vec::with_capacity(sources.len());
    let mut validation_failed = false;

    for (file_id, (path, text)) in sources.iter().enumerate() {
        log::info!("compiling '{}'", path);
        let unit = compile_unit(path, text, file_id as u32, options, &mut diagnostics);
        if !unit.validation.valid {
            validation_failed = true;
        }
        units.push(unit);
    }

    let mut success = !diagnostics.has_errors() && !validation_failed;
    if options.strict && diagnostics.warning_count() > 0 {
        log::info!("strict mode: {} warning(s) fail the build", diagnostics.warning_count());
        success = false;
    }

    CompileOutput { units, diagnostics, success }
}

fn compile_unit(
    path: &str,
    text: &str,
    file_id: u32,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> CompiledUnit {
    // Lexing never aborts; bad input degrades to diagnostics.
    let mut lexer = Lexer::new(text, file_id);
    let tokens = lexer.tokenize();
    log::debug!("'{}': {} tokens", path, tokens.len());
    diagnostics.extend(lexer.take_diagnostics());

    let mut parser = Parser::new(tokens);
    let ast_result = parser.parse();
    diagnostics.extend(parser.take_diagnostics());
    let mut ast = ast_result;

    let analyzer_options = AnalyzerOptions {
        run_advanced_analysis: options.run_advanced_analysis,
    };
    let (analysis, sema_diags) = Analyzer::analyze(&mut ast, analyzer_options);
    diagnostics.extend(sema_diags);

    let (mut il, lowering_diags) = lower_program(&ast, &analysis);
    diagnostics.extend(lowering_diags);

    let validation = match run_ssa(&mut il) {
        Ok(()) => validate_module(&il, &ValidatorConfig::default()),
        Err(error) => {
            // An SSA failure is an internal invariant violation; surface
            // it through the validation result so codegen never runs.
            log::warn!("'{}': SSA construction failed: {}", path, error);
            ValidationResult {
                valid: false,
                errors: vec![sable_il::ValidationIssue {
                    message: error.to_string(),
                    function: None,
                    block: None,
                    inst: None,
                }],
                warnings: Vec::new(),
            }
        }
    };

    CompiledUnit {
        path: path.to_string(),
        ast,
        analysis,
        il,
        validation,
    }
}

/// Convenience for hosts compiling a single in-memory module.
pub fn compile_source(path: &str, text: &str, options: &CompileOptions) -> CompileOutput {
    compile(&[(path.to_string(), text.to_string())], options)
}

/// Render the diagnostics of an output, worst first, for terminal use.
pub fn render_diagnostics(output: &CompileOutput) -> String {
    let mut lines: Vec<String> = Vec::new();
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        for diagnostic in output.diagnostics.iter().filter(|d| d.severity == severity) {
            lines.push(diagnostic.to_string());
        }
    }
    lines.join("\n")
}
