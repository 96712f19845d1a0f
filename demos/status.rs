use std::io::{self, Write};
use std::time::Duration;

use niimprint::ble::{connect, scan};
use niimprint::InfoType;

/// Example: Query printer info and heartbeat in a loop
/// - Scans for BLE label printers
/// - Lets user select device
/// - Reads device info, then heartbeat 10 times
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Scanning for label printers for 3 seconds...");
    let devices = scan(Duration::from_secs(3)).await?;
    if devices.is_empty() {
        println!(
            "No devices found. Make sure your Bluetooth adapter is up and the printer is powered on and advertising."
        );
        return Ok(());
    }

    println!("Found devices:");
    for (i, d) in devices.iter().enumerate() {
        println!("  {}) id={} name={:?}", i + 1, d.id, d.name);
    }

    let mut input = String::new();
    let chosen = loop {
        print!("Select device number to connect to (1-{}): ", devices.len());
        io::stdout().flush()?;
        input.clear();
        io::stdin().read_line(&mut input)?;
        if let Ok(n) = input.trim().parse::<usize>() {
            if n >= 1 && n <= devices.len() {
                break &devices[n - 1];
            }
        }
        println!("Invalid selection.");
    };

    println!("Connecting to device id={} name={:?} ...", chosen.id, chosen.name);
    let printer = connect(chosen, Duration::from_secs(10)).await?;

    match printer.get_info_summary().await {
        Ok(info) => println!("SW {} HW {} S/N {}", info.soft_version, info.hard_version, info.serial),
        Err(e) => eprintln!("Failed to read device info: {}", e),
    }
    match printer.get_info(InfoType::Battery).await {
        Ok(b) => println!("Battery -> {:02x?}", b),
        Err(e) => eprintln!("Failed to read battery: {}", e),
    }
    match printer.get_rfid().await {
        Ok(Some(tag)) => println!("Label roll -> {:?}", tag),
        Ok(None) => println!("Label roll -> no RFID tag"),
        Err(e) => eprintln!("Failed to read RFID: {}", e),
    }

    for i in 0..10 {
        match printer.heartbeat().await {
            Ok(hb) => println!("Heartbeat {} -> {:?}", i + 1, hb),
            Err(e) => eprintln!("Heartbeat {} failed: {}", i + 1, e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    printer.close().await?;
    Ok(())
}
