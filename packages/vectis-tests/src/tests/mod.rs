mod deployer;
mod governance;
mod orchestrator;
mod relay;
mod session;
