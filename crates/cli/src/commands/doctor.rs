//! `riskprofiler doctor`: check configuration and completion-service health.

use riskprofiler_config::AppConfig;
use std::time::Duration;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("RiskProfiler Doctor: System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file, using defaults. Run `riskprofiler onboard` to create one");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found; fix the config before continuing.");
            return Ok(());
        }
    };

    println!(
        "  [ok]   Provider: {} / model {}",
        config.default_provider,
        config.effective_model()
    );

    match riskprofiler_store::build_from_config(&config.store) {
        Ok(store) => match store.count().await {
            Ok(count) => println!("  [ok]   Session store: {} ({count} sessions)", store.name()),
            Err(e) => {
                println!("  [fail] Session store unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Session store: {e}");
            issues += 1;
        }
    }

    let router = riskprofiler_providers::build_from_config(&config);
    match router.default() {
        Some(provider) => {
            let probe = Duration::from_secs(10);
            match tokio::time::timeout(probe, provider.health_check()).await {
                Ok(Ok(true)) => println!("  [ok]   Completion service reachable"),
                Ok(Ok(false)) => {
                    println!("  [fail] Completion service answered but reports unhealthy");
                    issues += 1;
                }
                Ok(Err(e)) => {
                    println!("  [fail] Completion service unreachable: {e}");
                    issues += 1;
                }
                Err(_) => {
                    println!("  [fail] Completion service did not answer within {}s", probe.as_secs());
                    issues += 1;
                }
            }

            // Some backends don't list models; only check when they do
            let wanted = config.effective_model();
            if let Ok(Ok(models)) = tokio::time::timeout(probe, provider.list_models()).await
                && !models.is_empty()
            {
                if models.iter().any(|m| m == wanted || m.starts_with(&format!("{wanted}:"))) {
                    println!("  [ok]   Model '{wanted}' available");
                } else {
                    println!("  [warn] Model '{wanted}' not listed by the backend");
                    issues += 1;
                }
            }
        }
        None => {
            println!("  [fail] No default provider configured");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
