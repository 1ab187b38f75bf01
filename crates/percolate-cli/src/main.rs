use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;

use percolate_core::config::{
    Config, InputSource, NormalizerType, OswLevel, ProteinConfig, SearchInputType,
};
use percolate_core::pipeline::Pipeline;

fn cli() -> Command {
    Command::new("percolate")
        .version(clap::crate_version!())
        .disable_version_flag(true)
        .about("Semi-supervised rescoring and confidence estimation for peptide-spectrum matches")
        .after_help(
            "The tab-delimited input fields are:\n  \
             id <tab> label <tab> scannr <tab> feature1 <tab> ... <tab> featureN \
             <tab> peptide <tab> proteinId1 <tab> .. <tab> proteinIdM\n\
             Labels are interpreted as 1 -- positive and test set, -1 -- negative set.\n\
             With the --doc option the first and second feature should contain the \
             retention time and the difference between observed and calculated mass.",
        )
        .arg(
            Arg::new("pin")
                .help("Tab-delimited input file (pin format)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version information")
                .action(ArgAction::Version),
        )
        .arg(
            Arg::new("xmloutput")
                .short('X')
                .long("xmloutput")
                .help("Path to xml-output (pout) file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("stdinput")
                .long("stdinput")
                .help("Read tab-input format (pin-tab) from standard input")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stdinput-xml")
                .short('e')
                .long("stdinput-xml")
                .help("Read xml-input format (pin-xml) from standard input")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("decoy-xml-output")
                .short('Z')
                .long("decoy-xml-output")
                .help("Include decoys (PSMs and peptides) in the xml-output. Only available if -X is set")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("Cpos")
                .short('p')
                .long("Cpos")
                .help("Penalty for mistakes made on positive examples. Set by cross validation if not specified")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("Cneg")
                .short('n')
                .long("Cneg")
                .help("Penalty for mistakes made on negative examples. Set by cross validation if not specified or if -p is not specified")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("testFDR")
                .short('t')
                .long("testFDR")
                .help("False discovery rate threshold for evaluating best cross validation result and reported end result. Default = 0.01")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("trainFDR")
                .short('F')
                .long("trainFDR")
                .help("False discovery rate threshold to define positive examples in training. Set to testFDR if 0. Default = 0.01")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("maxiter")
                .short('i')
                .long("maxiter")
                .help("Maximal number of iterations. Default = 10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("subset-max-train")
                .short('N')
                .long("subset-max-train")
                .help("Only train the SVM on a subset of <x> PSMs, and use the resulting score vector to evaluate the other PSMs. Recommended when analyzing huge numbers (>1 million) of PSMs. When set to 0, all PSMs are used for training as normal. Default = 0")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("quick-validation")
                .short('x')
                .long("quick-validation")
                .help("Quicker execution by reduced internal cross-validation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tab-out")
                .short('J')
                .long("tab-out")
                .help("Output computed features to given file in pin-tab format")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("tab-in")
                .short('j')
                .long("tab-in")
                .help("Input file given in pin-tab format. This is the default setting, the flag is only present for backwards compatibility")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("osw-in")
                .long("osw-in")
                .help("Input file given in OpenSWATH OSW format")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("osw-level")
                .long("osw-level")
                .help("Data-level (MS1, MS2 or T for transitions) for OpenSWATH. Default = MS2")
                .default_value("MS2"),
        )
        .arg(
            Arg::new("xml-in")
                .short('k')
                .long("xml-in")
                .help("Input file given in the deprecated pin-xml format")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("weights")
                .short('w')
                .long("weights")
                .help("Output final weights to given file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("init-weights")
                .short('W')
                .long("init-weights")
                .help("Read initial weights from given file (one per line)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("default-direction")
                .short('V')
                .long("default-direction")
                .help("Use given feature name as initial search direction; can be negated to indicate that a lower value is better"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Set verbosity of output: 0 = no processing info, 5 = all. Default = 2")
                .value_parser(clap::value_parser!(u8).range(0..=5)),
        )
        .arg(
            Arg::new("no-terminate")
                .short('o')
                .long("no-terminate")
                .help("Do not stop execution when encountering questionable SVM inputs or results")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("unitnorm")
                .short('u')
                .long("unitnorm")
                .help("Use unit normalization [0-1] instead of standard deviation normalization")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-each-iteration")
                .short('R')
                .long("test-each-iteration")
                .help("Measure performance on test set each iteration")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("override")
                .short('O')
                .long("override")
                .help("Override error check and do not fall back on default score vector in case of suspect score vector from the SVM")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .short('S')
                .long("seed")
                .help("Set seed of the random number generator. Default = 1")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("doc")
                .short('D')
                .long("doc")
                .help("Include description of correct features, i.e. features describing the difference between the observed and predicted retention time and precursor mass")
                .num_args(0..=1)
                .default_missing_value("15")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("klammer")
                .short('K')
                .long("klammer")
                .help("Retention time features are calculated as in Klammer et al. Only available if -D is set")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("results-peptides")
                .short('r')
                .long("results-peptides")
                .help("Output tab delimited results of peptides to a file instead of stdout (will be ignored if used with -U option)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decoy-results-peptides")
                .short('B')
                .long("decoy-results-peptides")
                .help("Output tab delimited results for decoy peptides into a file (will be ignored if used with -U option)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("results-psms")
                .short('m')
                .long("results-psms")
                .help("Output tab delimited results of PSMs to a file instead of stdout")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decoy-results-psms")
                .short('M')
                .long("decoy-results-psms")
                .help("Output tab delimited results for decoy PSMs into a file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("only-psms")
                .short('U')
                .long("only-psms")
                .help("Do not remove redundant peptides; keep all PSMs and exclude peptide level probabilities")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("post-processing-mix-max")
                .short('y')
                .long("post-processing-mix-max")
                .help("Use the mix-max method to assign q-values and PEPs. Only has an effect if the input PSMs are from separate target and decoy searches. This is the default setting")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("post-processing-tdc")
                .short('Y')
                .long("post-processing-tdc")
                .help("Replace the mix-max method by target-decoy competition for assigning q-values and PEPs. If the input PSMs come from separate searches, the learned scores eliminate the lower scoring target or decoy PSM(s) of each scan+expMass combination. Automatically turned on for concatenated searches")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("search-input")
                .short('I')
                .long("search-input")
                .help("Type of target-decoy search: \"auto\" (detected automatically), \"concatenated\" (single search on concatenated target-decoy database) or \"separate\" (two searches). Default = \"auto\"")
                .default_value("auto"),
        )
        .arg(
            Arg::new("no-schema-validation")
                .short('s')
                .long("no-schema-validation")
                .help("Skip validation of input file against xml schema")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("picked-protein")
                .short('f')
                .long("picked-protein")
                .help("Use the picked protein-level FDR to infer protein probabilities. Provide the fasta file as the argument to this flag for protein grouping based on an in-silico digest, or set to \"auto\" to skip grouping"),
        )
        .arg(
            Arg::new("fido-protein")
                .short('A')
                .long("fido-protein")
                .help("Use the Fido algorithm to infer protein probabilities")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("results-proteins")
                .short('l')
                .long("results-proteins")
                .help("Output tab delimited results of proteins to a file instead of stdout (only valid if -A or -f is active)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decoy-results-proteins")
                .short('L')
                .long("decoy-results-proteins")
                .help("Output tab delimited results for decoy proteins into a file (only valid if -A or -f is active)")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("protein-decoy-pattern")
                .short('P')
                .long("protein-decoy-pattern")
                .help("Text pattern identifying decoy proteins in the database. Default = \"random_\""),
        )
        .arg(
            Arg::new("protein-enzyme")
                .short('z')
                .long("protein-enzyme")
                .help("Type of enzyme used for the in-silico digest. Default = \"trypsin\"")
                .default_value("trypsin"),
        )
        .arg(
            Arg::new("protein-report-fragments")
                .short('c')
                .long("protein-report-fragments")
                .help("Report a comma-separated list of protein IDs when identified peptides of one protein are a subset of another's, instead of discarding the fragment protein")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("protein-report-duplicates")
                .short('g')
                .long("protein-report-duplicates")
                .help("Report the IDs of proteins containing exactly the same set of peptides as a comma-separated list instead of discarding all but one")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fido-alpha")
                .short('a')
                .long("fido-alpha")
                .help("Fido's probability with which a present protein emits an associated peptide. Set by grid search if not specified")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("fido-beta")
                .short('b')
                .long("fido-beta")
                .help("Fido's probability of creation of a peptide from noise. Set by grid search if not specified")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("fido-gamma")
                .short('G')
                .long("fido-gamma")
                .help("Fido's prior probability that a protein is present in the sample. Set by grid search if not specified")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("fido-empirical-protein-q")
                .short('q')
                .long("fido-empirical-protein-q")
                .help("Output empirical p-values and q-values for Fido using target-decoy analysis")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fido-gridsearch-depth")
                .short('d')
                .long("fido-gridsearch-depth")
                .help("Gridsearch depth 0 (fastest) to 2 (slowest) for the estimation of alpha, beta and gamma. Default = 0")
                .value_parser(clap::value_parser!(u32).range(0..=4)),
        )
        .arg(
            Arg::new("fido-fast-gridsearch")
                .short('T')
                .long("fido-fast-gridsearch")
                .help("Apply the specified threshold to PSM, peptide and protein probabilities for a faster grid search. Default = 0")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("fido-no-split-large-components")
                .short('C')
                .long("fido-no-split-large-components")
                .help("Do not approximate the posterior distribution by splitting large graph components into subgraphs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fido-protein-truncation-threshold")
                .short('E')
                .long("fido-protein-truncation-threshold")
                .help("Proteins with no associated peptide above this probability get probability 0. Default = 0.01")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("fido-gridsearch-mse-threshold")
                .short('H')
                .long("fido-gridsearch-mse-threshold")
                .help("Q-value threshold used in the MSE and ROC AUC computation of the grid search. Default = 0.1")
                .value_parser(clap::value_parser!(f64)),
        )
}

fn resolve_input(matches: &ArgMatches) -> Result<InputSource> {
    let positional = matches.get_one::<PathBuf>("pin");
    let tab_in = matches.get_one::<PathBuf>("tab-in");
    let xml_in = matches.get_one::<PathBuf>("xml-in");
    let osw_in = matches.get_one::<PathBuf>("osw-in");
    let stdin_tab = matches.get_flag("stdinput");
    let stdin_xml = matches.get_flag("stdinput-xml");

    if let Some(path) = positional {
        if tab_in.is_some() || xml_in.is_some() {
            bail!("use one of either pin-xml or tab-delimited input format, not both");
        }
        if stdin_tab || stdin_xml {
            bail!("the pin file has already been given as a stdin argument");
        }
        return Ok(InputSource::PinFile(path.clone()));
    }
    if let Some(path) = tab_in {
        return Ok(InputSource::PinFile(path.clone()));
    }
    if let Some(path) = osw_in {
        let level: OswLevel = matches
            .get_one::<String>("osw-level")
            .unwrap()
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        return Ok(InputSource::Osw {
            path: path.clone(),
            level,
        });
    }
    if let Some(path) = xml_in {
        return Ok(InputSource::PinXmlFile(path.clone()));
    }
    if stdin_xml {
        return Ok(InputSource::PinXmlStdin);
    }
    if stdin_tab {
        return Ok(InputSource::PinStdin);
    }
    bail!("too few arguments: no input file given; invoke with --help for usage");
}

fn build_config(matches: &ArgMatches) -> Result<Config> {
    let mut cfg = Config {
        input: resolve_input(matches)?,
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
        ..Config::default()
    };

    cfg.xml_output = matches.get_one::<PathBuf>("xmloutput").cloned();
    cfg.tab_output = matches.get_one::<PathBuf>("tab-out").cloned();
    cfg.weight_output = matches.get_one::<PathBuf>("weights").cloned();
    cfg.psm_results = matches.get_one::<PathBuf>("results-psms").cloned();
    cfg.decoy_psm_results = matches.get_one::<PathBuf>("decoy-results-psms").cloned();

    cfg.xml_print_decoys = matches.get_flag("decoy-xml-output");
    cfg.no_terminate = matches.get_flag("no-terminate");
    cfg.override_suspect = matches.get_flag("override");
    cfg.report_each_iteration = matches.get_flag("test-each-iteration");
    cfg.quick_validation = matches.get_flag("quick-validation");
    cfg.post_processing_mixmax = matches.get_flag("post-processing-mix-max");
    cfg.post_processing_tdc = matches.get_flag("post-processing-tdc");
    cfg.klammer = matches.get_flag("klammer");

    if matches.get_flag("unitnorm") {
        cfg.normalizer = NormalizerType::Unit;
    }
    if let Some(&value) = matches.get_one::<f64>("Cpos") {
        cfg.cpos = value;
    }
    if let Some(&value) = matches.get_one::<f64>("Cneg") {
        cfg.cneg = value;
        if cfg.cpos == 0.0 {
            log::warn!(
                "the positive penalty (Cpos) is 0, so both penalties will be cross-validated; \
                 the --Cneg option has to be used together with --Cpos"
            );
        }
    }
    if let Some(&value) = matches.get_one::<f64>("testFDR") {
        cfg.test_fdr = value;
    }
    if let Some(&value) = matches.get_one::<f64>("trainFDR") {
        cfg.selection_fdr = if value > 0.0 { value } else { cfg.test_fdr };
    }
    if let Some(&value) = matches.get_one::<u32>("maxiter") {
        cfg.num_iterations = value;
    }
    if let Some(&value) = matches.get_one::<usize>("subset-max-train") {
        cfg.subset_max_train = value;
    }
    if let Some(&value) = matches.get_one::<u64>("seed") {
        cfg.seed = value;
    }
    if let Some(&value) = matches.get_one::<u8>("verbose") {
        cfg.verbosity = value;
    }
    if let Some(&value) = matches.get_one::<u32>("doc") {
        cfg.doc_type = Some(value);
    }
    cfg.init_weights = matches.get_one::<PathBuf>("init-weights").cloned();
    cfg.default_direction = matches.get_one::<String>("default-direction").cloned();
    cfg.search_input = matches
        .get_one::<String>("search-input")
        .unwrap()
        .parse::<SearchInputType>()
        .map_err(|e| anyhow::anyhow!(e))?;

    if matches.get_flag("no-schema-validation") {
        log::debug!("schema validation flag is accepted for compatibility and ignored");
    }

    let use_fido = matches.get_flag("fido-protein");
    let picked = matches.get_one::<String>("picked-protein");

    if matches.get_flag("only-psms") {
        if use_fido {
            bail!(
                "the -U option cannot be used in conjunction with -A: peptide level \
                 statistics are needed to calculate protein level ones"
            );
        }
        cfg.report_unique_peptides = false;

        if let Some(path) = matches.get_one::<PathBuf>("results-peptides") {
            if cfg.psm_results.is_none() {
                log::warn!(
                    "the -r option cannot be used in conjunction with -U: no peptide level \
                     statistics are calculated, redirecting PSM level statistics to the provided file"
                );
                cfg.psm_results = Some(path.clone());
            } else {
                log::warn!(
                    "the -r option cannot be used in conjunction with -U: no peptide level \
                     statistics are calculated, ignoring -r"
                );
            }
        }
        if let Some(path) = matches.get_one::<PathBuf>("decoy-results-peptides") {
            if cfg.decoy_psm_results.is_none() {
                log::warn!(
                    "the -B option cannot be used in conjunction with -U: redirecting decoy \
                     PSM level statistics to the provided file"
                );
                cfg.decoy_psm_results = Some(path.clone());
            } else {
                log::warn!(
                    "the -B option cannot be used in conjunction with -U: ignoring -B"
                );
            }
        }
    } else {
        cfg.peptide_results = matches.get_one::<PathBuf>("results-peptides").cloned();
        cfg.decoy_peptide_results = matches.get_one::<PathBuf>("decoy-results-peptides").cloned();
    }

    if use_fido || picked.is_some() {
        let mut protein = ProteinConfig {
            use_fido,
            fasta: picked.cloned(),
            ..ProteinConfig::default()
        };
        if let Some(pattern) = matches.get_one::<String>("protein-decoy-pattern") {
            protein.decoy_pattern = pattern.clone();
        }
        if let Some(enzyme) = matches.get_one::<String>("protein-enzyme") {
            protein.enzyme = enzyme.clone();
        }
        protein.report_fragment_proteins = matches.get_flag("protein-report-fragments");
        protein.report_duplicate_proteins = matches.get_flag("protein-report-duplicates");
        protein.output_empirical_qvalues = matches.get_flag("fido-empirical-protein-q");
        if let Some(&v) = matches.get_one::<f64>("fido-alpha") {
            protein.fido_alpha = v;
        }
        if let Some(&v) = matches.get_one::<f64>("fido-beta") {
            protein.fido_beta = v;
        }
        if let Some(&v) = matches.get_one::<f64>("fido-gamma") {
            protein.fido_gamma = v;
        }
        if let Some(&v) = matches.get_one::<u32>("fido-gridsearch-depth") {
            protein.fido_gridsearch_depth = v;
        }
        if let Some(&v) = matches.get_one::<f64>("fido-fast-gridsearch") {
            protein.fido_gridsearch_threshold = v;
        }
        protein.fido_no_split_large_components =
            matches.get_flag("fido-no-split-large-components");
        if let Some(&v) = matches.get_one::<f64>("fido-protein-truncation-threshold") {
            protein.fido_protein_truncation_threshold = v;
        }
        if let Some(&v) = matches.get_one::<f64>("fido-gridsearch-mse-threshold") {
            protein.fido_gridsearch_mse_threshold = v;
        }
        cfg.protein = Some(protein);
        cfg.protein_results = matches.get_one::<PathBuf>("results-proteins").cloned();
        cfg.decoy_protein_results = matches.get_one::<PathBuf>("decoy-results-proteins").cloned();
    }

    if let InputSource::Osw { .. } = cfg.input {
        cfg.report_unique_peptides = false;
        cfg.search_input = SearchInputType::Separate;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() {
    let matches = cli().get_matches();
    let verbosity = matches.get_one::<u8>("verbose").copied().unwrap_or(2);
    let mut builder = env_logger::Builder::default();
    builder.filter_level(level_filter(verbosity));
    if std::env::var("PERCOLATE_LOG").is_ok() {
        builder.parse_env(env_logger::Env::default().filter_or("PERCOLATE_LOG", "info"));
    }
    builder.init();

    let result = build_config(&matches).and_then(|cfg| Pipeline::new(cfg).run());
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
