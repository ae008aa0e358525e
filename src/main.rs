use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match acc_forms_dashboard_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("acc-forms-dashboard: {err}");
            ExitCode::FAILURE
        }
    }
}
