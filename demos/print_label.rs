use std::io::{self, Write};
use std::time::Duration;

use niimprint::ble::{connect, scan};
use niimprint::dithering::{ImageDithering, raster_from_path};
use niimprint::{PrintJob, Printer, Raster};

/// Example: Interactive label printing session
/// - Scans for BLE label printers
/// - Lets user select device
/// - Prints an image file or a test pattern
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
    println!("Connected successfully.");

    let result = run_session(&printer).await;
    printer.close().await?;
    result
}

/// Prompts for an image or a test pattern and prints it.
async fn run_session<T: niimprint::Transport>(printer: &Printer<T>) -> Result<(), Box<dyn std::error::Error>> {
    let config = *printer.config();
    let mut mode = String::new();
    print!("Choose what to print: 1 for test pattern, 2 for image: ");
    io::stdout().flush()?;
    io::stdin().read_line(&mut mode)?;

    let raster = if mode.trim() == "2" {
        let mut img_path = String::new();
        print!("Enter the path to the image: ");
        io::stdout().flush()?;
        io::stdin().read_line(&mut img_path)?;
        let img_path = img_path.trim();
        if img_path.is_empty() {
            println!("No image path entered, aborting.");
            return Ok(());
        }

        let mut dithering_mode = String::new();
        print!("Choose dithering mode: 1=Threshold, 2=Floyd-Steinberg, 3=Atkinson, 4=Halftone, 5=Bayer: ");
        io::stdout().flush()?;
        io::stdin().read_line(&mut dithering_mode)?;
        let dithering = match dithering_mode.trim() {
            "2" => ImageDithering::FloydSteinberg,
            "3" => ImageDithering::Atkinson,
            "4" => ImageDithering::Halftone,
            "5" => ImageDithering::Bayer,
            _ => ImageDithering::Threshold,
        };
        raster_from_path(img_path, config.row_width as u32, config.max_height_px(), dithering)?
    } else {
        checkerboard(config.row_width, 240)?
    };

    let mut quantity = String::new();
    print!("Number of copies (default 1): ");
    io::stdout().flush()?;
    io::stdin().read_line(&mut quantity)?;
    let quantity = quantity.trim().parse::<u16>().unwrap_or(1);

    println!("Sending print job ({}x{})...", raster.width(), raster.height());
    match printer.print(&PrintJob::new(raster).quantity(quantity)).await {
        Ok(()) => println!("Print job completed."),
        Err(e) => eprintln!("Print job failed: {}", e),
    }
    Ok(())
}

fn checkerboard(width: usize, height: usize) -> niimprint::Result<Raster> {
    let mut raster = Raster::blank(width, height)?;
    for y in 0..height {
        for x in 0..width {
            raster.set(x, y, (x / 16 + y / 16) % 2 == 0);
        }
    }
    Ok(raster)
}
