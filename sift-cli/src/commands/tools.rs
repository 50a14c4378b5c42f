use sift_core::config::SiftConfig;
use sift_core::tools::ToolAvailability;

pub fn run(config: &SiftConfig) {
    let availability = ToolAvailability::probe(&config.tools);

    println!("External tools:");
    for (name, tool) in config.tools.iter() {
        let status = if !tool.enabled {
            "disabled".to_string()
        } else if let Some(path) = availability.path(name) {
            format!("available ({})", path.display())
        } else {
            format!("not found ({})", tool.path)
        };
        println!("  {name:<12} {status}");
    }
    println!();
    println!("Rule checks always run; unavailable tools are skipped.");
}
