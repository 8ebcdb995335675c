
mod tests_state_clientstate;
