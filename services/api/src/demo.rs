use crate::infra::{applicant_service, InMemoryOutbox};
use clap::Args;
use std::sync::Arc;
use tokensale::applicants::{
    ApplicantServiceError, ApplyRequest, ParticipationRequest, RegistrationRequest,
    SessionRequest,
};
use tokensale::config::AppConfig;
use tokensale::error::AppError;
use tokensale::sale::SaleConfig;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant email used for the walkthrough
    #[arg(long, default_value = "john@galt.com")]
    pub(crate) email: String,
    /// Pledged amount submitted at registration
    #[arg(long, default_value_t = 3.0)]
    pub(crate) eth_amount: f64,
    /// Participation address submitted in the final step
    #[arg(long, default_value = "0x00")]
    pub(crate) eth_address: String,
    /// Use the configured sale window instead of an always-open one
    #[arg(long)]
    pub(crate) configured_window: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        email,
        eth_amount,
        eth_address,
        configured_window,
    } = args;

    let config = AppConfig::load()?;
    let sale = if configured_window {
        config.sale.clone()
    } else {
        SaleConfig::open()
    };
    let outbox = Arc::new(InMemoryOutbox::default());
    let service = applicant_service(&config.tokens, &config.mail, outbox.clone());

    println!("Token sale registration demo");
    println!(
        "Sale window: {} -> {} | accepting applicants: {}",
        sale.start_time
            .map_or_else(|| "unbounded".to_string(), |start| start.to_rfc3339()),
        sale.end_time
            .map_or_else(|| "unbounded".to_string(), |end| end.to_rfc3339()),
        sale.accept_applicants
    );

    println!("\n1. Apply");
    let applicant = match service.apply(
        &sale,
        ApplyRequest {
            email: Some(email.clone()),
        },
    ) {
        Ok(applicant) => applicant,
        Err(err) => {
            println!("  Application rejected: {}", err);
            return Ok(());
        }
    };
    print_json("Receipt", &applicant.application_receipt());

    println!("\n2. Open a session");
    let temporary = match service.temporary_token(&applicant) {
        Ok(token) => token,
        Err(err) => return report_and_stop(err),
    };
    println!("  Temporary token issued ({} chars)", temporary.len());
    let grant = match service.issue_session(SessionRequest {
        token: Some(temporary),
    }) {
        Ok(grant) => grant,
        Err(err) => return report_and_stop(err),
    };
    println!("  Session token issued ({} chars)", grant.token.len());

    let applicant = match service.resolve_session(&grant.token) {
        Ok(Some(applicant)) => applicant,
        Ok(None) => {
            println!("  Session resolved to no applicant");
            return Ok(());
        }
        Err(err) => return report_and_stop(err),
    };
    println!("  Phase: {}", applicant.phase().label());

    println!("\n3. Register");
    match service.register(&sale, &applicant, RegistrationRequest::default()) {
        Ok(_) => println!("  Empty registration unexpectedly accepted"),
        Err(err) => println!("  Empty registration rejected: {}", err),
    }
    let applicant = match service.register(
        &sale,
        &applicant,
        RegistrationRequest {
            first_name: Some("John".to_string()),
            last_name: Some("Galt".to_string()),
            eth_amount: Some(eth_amount),
        },
    ) {
        Ok(applicant) => applicant,
        Err(err) => return report_and_stop(err),
    };
    print_json("Profile", &applicant.profile());

    println!("\n4. Participate");
    let applicant = match service.participate(
        &applicant,
        ParticipationRequest {
            eth_address: Some(eth_address),
        },
    ) {
        Ok(applicant) => applicant,
        Err(err) => return report_and_stop(err),
    };
    print_json("Profile", &applicant.profile());
    println!("  Phase: {}", applicant.phase().label());

    let messages = outbox.messages();
    if messages.is_empty() {
        println!("\nEmails: none dispatched");
    } else {
        println!("\nEmails");
        for message in messages {
            println!("- {} -> {}", message.template.subject(), message.to);
        }
    }

    Ok(())
}

fn report_and_stop(err: ApplicantServiceError) -> Result<(), AppError> {
    println!("  Step failed: {}", err);
    Ok(())
}

fn print_json<T: serde::Serialize>(label: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("  {}:\n{}", label, json),
        Err(err) => println!("  {} unavailable: {}", label, err),
    }
}
