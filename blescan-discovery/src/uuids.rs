use std::sync::LazyLock;

use uuid::Uuid;

fn parse(constant: &str) -> Uuid {
    Uuid::parse_str(constant).expect("blescan-bt510 UUID constants are well-formed")
}

pub static PRIMARY_SERVICE_UUID: LazyLock<Uuid> =
    LazyLock::new(|| parse(blescan_bt510::PRIMARY_SERVICE_UUID));
pub static COMMAND_CHARACTERISTIC_UUID: LazyLock<Uuid> =
    LazyLock::new(|| parse(blescan_bt510::COMMAND_CHARACTERISTIC_UUID));
pub static RESPONSE_CHARACTERISTIC_UUID: LazyLock<Uuid> =
    LazyLock::new(|| parse(blescan_bt510::RESPONSE_CHARACTERISTIC_UUID));
