//! Provider inspection commands

use color_eyre::eyre::Result;
use tracing::info;

use shipmi_bmc::ProviderRegistry;

/// Print the name of every discovered provider, one per line
pub fn list(registry: &ProviderRegistry) -> Result<()> {
    let names = registry.names()?;
    if names.is_empty() {
        info!(
            "No providers found in: {}",
            registry
                .dirs()
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Print a provider's sources and command templates in INI form
pub fn show(registry: &ProviderRegistry, identifier: &str) -> Result<()> {
    let provider = registry.resolve(identifier)?;

    println!("# provider: {}", provider.name());
    for source in provider.sources() {
        println!("# source: {}", source.display());
    }

    for section in provider.sections() {
        println!();
        println!("[{}]", section);
        for (action, template) in provider.actions(section) {
            // continuation lines keep their indent so the output parses again
            println!("{} = {}", action, template.replace('\n', "\n    "));
        }
    }
    Ok(())
}
