//! Seed the reference catalogs.
//!
//! Inserts are idempotent (`INSERT OR IGNORE` against the unique name
//! columns), so seeding can run at every startup. "Other" carries an
//! outsized popularity so it always sorts first in dropdowns.

use rusqlite::{params, Connection};

use crate::db::queries::now;
use crate::error::Result;

pub fn seed_catalogs(conn: &Connection) -> Result<()> {
    tracing::info!("seeding reference catalogs");
    seed_weapon_types(conn)?;
    seed_calibers(conn)?;
    seed_manufacturers(conn)?;
    Ok(())
}

fn seed_weapon_types(conn: &Connection) -> Result<()> {
    const TYPES: &[(&str, &str, i32)] = &[
        ("Other", "Other", 999),
        ("Handgun", "Pistol", 100),
        ("Semi-Automatic Rifle", "AR", 90),
        ("Shotgun", "Shotgun", 85),
        ("Revolver", "Revolver", 80),
        ("Rifle", "Rifle", 75),
        ("Carbine", "Carbine", 60),
        ("Bolt-Action Rifle", "Bolt Rifle", 55),
        ("Semi-Automatic Shotgun", "Semi-Auto Shotgun", 50),
        ("Pump-Action Shotgun", "Pump Shotgun", 45),
        ("Lever-Action Rifle", "Lever Rifle", 40),
        ("Sniper Rifle", "Sniper", 35),
        ("Designated Marksman Rifle", "DMR", 30),
        ("Precision Rifle", "Precision Rifle", 30),
        ("Submachine Gun", "SMG", 25),
        ("Battle Rifle", "Battle Rifle", 25),
        ("Personal Defense Weapon", "PDW", 20),
        ("Machine Gun", "MG", 15),
        ("Anti-Materiel Rifle", "AMR", 10),
    ];
    let ts = now();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO weapon_types (type, nickname, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
    )?;
    for (name, nickname, popularity) in TYPES {
        stmt.execute(params![name, nickname, popularity, ts])?;
    }
    Ok(())
}

fn seed_calibers(conn: &Connection) -> Result<()> {
    const CALIBERS: &[(&str, &str, i32)] = &[
        ("Other", "Other", 999),
        ("9mm Parabellum", "9", 100),
        ("45 ACP", "45", 90),
        ("22 Long Rifle", "22 LR", 85),
        ("12 Gauge", "12", 80),
        ("5.56\u{d7}45mm NATO", "5.56", 75),
        ("308 Winchester", "308", 70),
        ("38 Special", "38", 65),
        ("357 Magnum", "357", 60),
        ("40 S&W", "40", 55),
        ("380 ACP", "380", 50),
        ("223 Remington", "223", 45),
        ("6.5 Creedmoor", "6.5", 45),
        ("30-06 Springfield", "30-06", 40),
        ("7.62\u{d7}39mm", "7.62", 40),
        ("20 Gauge", "20", 40),
        ("44 Magnum", "44 Mag", 35),
        ("270 Winchester", "270", 35),
        ("7.62\u{d7}51mm NATO", "7.62 NATO", 35),
        ("22 Magnum", "22 Mag", 30),
        ("243 Winchester", "243", 30),
        ("300 AAC Blackout", "300 BLK", 30),
        ("300 Winchester Magnum", "300 WM", 25),
        ("44 Special", "44", 25),
        ("25 ACP", "25 ACP", 20),
        ("32 ACP", "32 ACP", 20),
        ("338 Lapua Magnum", "338 Lapua", 15),
        ("500 S&W Magnum", "500 S&W", 15),
        ("28 Gauge", "28", 15),
        ("50 AE", "50 AE", 15),
    ];
    let ts = now();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO calibers (caliber, nickname, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
    )?;
    for (name, nickname, popularity) in CALIBERS {
        stmt.execute(params![name, nickname, popularity, ts])?;
    }
    Ok(())
}

fn seed_manufacturers(conn: &Connection) -> Result<()> {
    const MANUFACTURERS: &[(&str, &str, &str)] = &[
        ("Smith & Wesson", "S&W", "USA"),
        ("Colt's Manufacturing Company", "Colt", "USA"),
        ("Remington Arms", "Remington", "USA"),
        ("Winchester Repeating Arms", "Winchester", "USA"),
        ("Sturm, Ruger & Co.", "Ruger", "USA"),
        ("Browning", "Browning", "USA"),
        ("Taurus", "Taurus", "Brazil/USA"),
        ("Kimber Manufacturing", "Kimber", "USA"),
        ("Springfield Armory", "Springfield", "USA"),
        ("Sig Sauer", "Sig", "Germany/USA"),
        ("Heckler & Koch", "H&K", "Germany"),
        ("Barrett Firearms Manufacturing", "Barrett", "USA"),
        ("Glock", "Glock", "Austria"),
        ("Beretta", "Beretta", "Italy"),
        ("\u{10c}esk\u{e1} zbrojovka (CZ)", "CZ", "Czech Republic"),
        ("FN Herstal", "FN", "Belgium"),
        ("Steyr Mannlicher", "Steyr", "Austria"),
        ("Walther", "Walther", "Germany"),
        ("IWI (Israel Weapon Industries)", "IWI", "Israel"),
        ("Kel-Tec", "Kel-Tec", "USA"),
        ("Rossi", "Rossi", "USA/Brazil"),
        ("Charter Arms", "Charter", "USA"),
        ("Uberti", "Uberti", "Italy/USA"),
        ("ArmaLite", "ArmaLite", "USA"),
        ("Magnum Research", "Magnum", "USA"),
        ("Mauser", "Mauser", "Germany"),
        ("Webley", "Webley", "UK"),
        ("Enfield", "Enfield", "UK"),
        ("Wilson Combat", "Wilson", "USA"),
        ("Nighthawk Custom", "Nighthawk", "USA"),
        ("Accuracy International", "AI", "UK"),
    ];
    let ts = now();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO manufacturers (name, nickname, country, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?4)",
    )?;
    for (name, nickname, country) in MANUFACTURERS {
        stmt.execute(params![name, nickname, country, ts])?;
    }
    Ok(())
}
