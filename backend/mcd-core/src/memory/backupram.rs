//! Internal backup RAM, mapped to odd sub CPU addresses at $FE0000-$FEFFFF

use mcd_common::num::GetBit;
use mcd_common::BoxedByteArray;

pub const BACKUP_RAM_LEN: usize = 8 * 1024;

const FOOTER_LEN: usize = 64;

// Directory footer written by the BIOS format routine
#[rustfmt::skip]
const FORMATTED_FOOTER: [u8; FOOTER_LEN] = [
    // $1FC0-$1FCF
    0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x5F, 0x00, 0x00, 0x00, 0x00, 0x40,
    // $1FD0-$1FDF
    0x00, 0x7D, 0x00, 0x7D, 0x00, 0x7D, 0x00, 0x7D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // $1FE0-$1FEF
    0x53, 0x45, 0x47, 0x41, 0x5F, 0x43, 0x44, 0x5F, 0x52, 0x4F, 0x4D, 0x00, 0x01, 0x00, 0x00, 0x00,
    // $1FF0-$1FFF
    0x52, 0x41, 0x4D, 0x5F, 0x43, 0x41, 0x52, 0x54, 0x52, 0x49, 0x44, 0x47, 0x45, 0x5F, 0x5F, 0x5F,
];

pub type BackupRam = BoxedByteArray<BACKUP_RAM_LEN>;

/// Backup RAM as left by the BIOS after formatting: all zeroes apart from the directory footer.
#[must_use]
pub fn formatted() -> BackupRam {
    let mut ram = BackupRam::new();
    ram[BACKUP_RAM_LEN - FOOTER_LEN..].copy_from_slice(&FORMATTED_FOOTER);
    ram
}

/// Build the initial backup RAM from persisted contents, falling back to a blank image when none
/// are given or they are the wrong size.
#[must_use]
pub fn initial(persisted: Option<&[u8]>, format: bool) -> BackupRam {
    if let Some(bytes) = persisted {
        match BackupRam::from_slice(bytes) {
            Some(ram) => return ram,
            None => log::warn!(
                "Ignoring persisted backup RAM of {} bytes, expected {BACKUP_RAM_LEN}",
                bytes.len()
            ),
        }
    }

    if format { formatted() } else { BackupRam::new() }
}

/// Index into backup RAM for a sub CPU address. Only odd addresses are mapped.
#[must_use]
pub fn index(address: u32) -> Option<usize> {
    address.bit(0).then(|| ((address & 0x3FFF) >> 1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn formatted_footer() {
        let ram = formatted();
        assert!(ram[..BACKUP_RAM_LEN - FOOTER_LEN].iter().all(|&b| b == 0));
        assert_eq!(&ram[0x1FE0..0x1FEB], b"SEGA_CD_ROM");
        assert_eq!(&ram[0x1FF0..0x1FFB], b"RAM_CARTRID");
    }

    #[test]
    fn persisted_contents() {
        let bytes = vec![0xA5; BACKUP_RAM_LEN];
        assert_eq!(&initial(Some(&bytes), true)[..], &bytes[..]);

        let short = vec![0xA5; 100];
        assert_eq!(initial(Some(&short), true), formatted());
        assert!(initial(None, false).iter().all(|&b| b == 0));
    }

    #[test]
    fn odd_bytes_only() {
        assert_eq!(index(0xFE0000), None);
        assert_eq!(index(0xFE0001), Some(0));
        assert_eq!(index(0xFE3FFF), Some(0x1FFF));
        // Mirrored every 16KB
        assert_eq!(index(0xFE4003), Some(1));
    }
}
