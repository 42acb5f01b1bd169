mod cli;

use anyhow::Context;
use zulip_stack::mapping::AmiRegionMap;
use zulip_stack::parameters::ParameterValues;
use zulip_stack::stack::{Environment, StackProps};
use zulip_stack::template::Template;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ZULIP_STACK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Synth(synth_cli) => synth(synth_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn synth(cli: cli::SynthCommand) -> anyhow::Result<()> {
    let template = build(&cli.stack)?;
    output(&cli.output, &template)?;
    Ok(())
}

fn props(stack: &cli::StackArgs) -> anyhow::Result<StackProps> {
    let mut parameters = ParameterValues::default();
    for file_path in &stack.parameter_files {
        parameters.load_file(file_path)?;
    }
    for assignment in &stack.parameters {
        parameters.insert_assignment(assignment)?;
    }

    let user_data = std::fs::read_to_string(&stack.user_data).with_context(|| {
        format!(
            "Unable to read user data script {}",
            stack.user_data.display()
        )
    })?;
    anyhow::ensure!(
        !user_data.trim().is_empty(),
        "User data script {} is empty",
        stack.user_data.display()
    );

    let mut props = StackProps::new(&stack.stack_name, user_data)
        .with_parameters(parameters)
        .with_version(zulip_stack::version::from_environment());

    if let Some(region) = &stack.region {
        props = props.with_environment(Environment::new(stack.account.clone(), region.clone()));
    }

    Ok(props)
}

fn build(stack: &cli::StackArgs) -> anyhow::Result<Template> {
    let props = props(stack)?;
    let template = zulip_stack::stack::build(&props).map_err(|e| {
        if let zulip_stack::stack::BuildError::Template(issues) = &e {
            for issue in issues.issues() {
                tracing::error!(%issue, "template issue");
            }
        }
        e
    })?;
    Ok(template)
}

fn output(output: &cli::OutputArgs, template: &Template) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), template)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), template)?,
    };

    Ok(())
}

/// (zulip-stack-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Graph(stack) => {
            let template = build(&stack)?;
            for resource in template.resources() {
                let condition = resource
                    .condition
                    .as_deref()
                    .map(|c| format!(" [{c}]"))
                    .unwrap_or_default();
                println!("{} ({}){condition}", resource.logical_id, resource.kind);
                for dependency in template.dependencies_of(&resource.logical_id) {
                    println!("  <- {dependency}");
                }
            }
        }
        Parameters(stack) => {
            let props = props(&stack)?;
            let template = zulip_stack::stack::build(&props)?;
            for parameter in template.parameters() {
                let value = parameter.resolve(props.parameters.get(&parameter.id))?;
                if parameter.no_echo {
                    println!("{} = ****", parameter.id);
                } else {
                    println!("{} = {value:?}", parameter.id);
                }
            }
        }
        Regions => {
            let ami_map = AmiRegionMap::generated();
            println!("image {}", ami_map.name());
            for region in ami_map.regions() {
                println!("{region} {}", ami_map.image_for(region)?);
            }
        }
    }

    Ok(())
}
