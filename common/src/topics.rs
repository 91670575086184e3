pub const TOPIC_CIRCUIT_COMMAND: &str = "smarter_circuits/command";

const TOPIC_THERMOSTAT_PREFIX: &str = "smarter_circuits/thermostats";

pub fn status_topic(room: &str) -> String {
    format!("{TOPIC_THERMOSTAT_PREFIX}/{room}/status")
}

pub fn command_topic(room: &str) -> String {
    format!("{TOPIC_THERMOSTAT_PREFIX}/{room}/command")
}
