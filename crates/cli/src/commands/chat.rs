//! `riskprofiler chat`: run a profiling interview in the terminal.

use riskprofiler_config::AppConfig;
use riskprofiler_core::error::{Error, SessionError};
use riskprofiler_core::profile::ClientProfile;
use riskprofiler_engine::{
    CompletionClient, ProfilePolicy, ProfileStatus, SessionOrchestrator,
};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let router = riskprofiler_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let store = riskprofiler_store::build_from_config(&config.store)?;
    let orchestrator = SessionOrchestrator::new(
        store,
        ProfilePolicy::from_config(&config.profiler),
        CompletionClient::from_config(provider, &config),
    );
    tracing::debug!(
        provider = orchestrator.client().provider_name(),
        store = orchestrator.store().name(),
        "Orchestrator ready"
    );

    println!();
    println!("  RiskProfiler: Client Onboarding");
    println!("  ===============================");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.effective_model());
    println!();
    println!("  Answer the advisor's questions and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    interview(&orchestrator, stdin, &mut stdout).await?;
    Ok(())
}

/// Drive one session from greeting to profile, reading answers line by line.
///
/// Returns the profile if the interview finished, `None` if input ran out
/// or the user quit first.
pub async fn interview<R, W>(
    orchestrator: &SessionOrchestrator,
    input: R,
    out: &mut W,
) -> Result<Option<ClientProfile>, Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let client_id = match orchestrator.start_session().await {
        Ok(start) => {
            print_reply(out, &start.greeting)?;
            start.client_id
        }
        Err(Error::Session(SessionError::GreetingUnavailable { client_id, reason })) => {
            writeln!(out, "  [Error] Could not reach the advisor: {reason}")?;
            writeln!(out, "  You can still start by introducing yourself.\n")?;
            client_id
        }
        Err(e) => return Err(e.into()),
    };

    let mut lines = input.lines();
    loop {
        write!(out, "  You > ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            return Ok(None);
        }

        match orchestrator.advance(&client_id, line).await {
            Ok(outcome) => {
                print_reply(out, &outcome.reply)?;
                match outcome.status {
                    ProfileStatus::Complete(profile) => {
                        for warning in &outcome.warnings {
                            writeln!(out, "  [Note] {warning}")?;
                        }
                        print_summary(out, &profile)?;
                        return Ok(Some(profile));
                    }
                    ProfileStatus::Malformed(e) => {
                        writeln!(out, "  [Note] The profile could not be read ({e}); let's continue.\n")?;
                    }
                    ProfileStatus::Pending => {}
                }
            }
            Err(e) if e.is_transient() => {
                writeln!(out, "  [Error] {e}")?;
                writeln!(out, "  Your answer was not recorded; please send it again.\n")?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn print_reply<W: Write>(out: &mut W, reply: &str) -> std::io::Result<()> {
    writeln!(out)?;
    for line in reply.lines() {
        writeln!(out, "  Advisor > {line}")?;
    }
    writeln!(out)
}

fn print_summary<W: Write>(out: &mut W, profile: &ClientProfile) -> std::io::Result<()> {
    let alloc = &profile.allocation;
    writeln!(out, "  ── Risk Profile ──────────────────────────")?;
    writeln!(out, "  Risk score:     {}/100", profile.risk_score)?;
    writeln!(out, "  Risk category:  {}", profile.risk_category)?;
    writeln!(
        out,
        "  Allocation:     {:.0}% stocks, {:.0}% bonds, {:.0}% cash, {:.0}% alternatives",
        alloc.stocks, alloc.bonds, alloc.cash, alloc.alternatives
    )?;
    if !profile.insights.is_empty() {
        writeln!(out, "  Insights:")?;
        for insight in &profile.insights {
            writeln!(out, "    - {insight}")?;
        }
    }
    if !profile.next_steps.is_empty() {
        writeln!(out, "  Next steps:")?;
        for (i, step) in profile.next_steps.iter().enumerate() {
            writeln!(out, "    {}. {step}", i + 1)?;
        }
    }
    writeln!(out)
}
