//! AES block
//!
//! The chip encrypts and decrypts with AES-CCM* or AES-GCM, moving data
//! between its buffers by DMA. One job runs at a time: [`DW3xxx::do_aes`]
//! checks the job, loads it, starts it and polls it to completion.

use super::{AesError, RxBuffer, DW3xxx};
use crate::{
    configs::{AesConfig, AesCoreType, AesMode, MicSize},
    ll::{Transport, SCRATCH_RAM, TX_BUFFER},
    Error,
};

/// Polls of `AES_STS` before a job is given up
const AES_POLLS: usize = 1000;

/// The payload length field is 10 bits wide
const MAX_PAYLOAD_LEN: usize = 1023;

/// The header length field is 7 bits wide
const MAX_HEADER_LEN: usize = 127;

const FCS_LEN: usize = 2;

/// A memory the AES block reads from or writes to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AesPort {
    /// The scratch RAM
    Scratch,
    /// The receive buffer the host owns
    RxBuffer,
    /// The transmit buffer
    TxBuffer,
}

impl AesPort {
    /// How many bytes the memory holds
    pub fn capacity(self) -> usize {
        match self {
            AesPort::Scratch => 127,
            AesPort::RxBuffer => 1023,
            AesPort::TxBuffer => 1024,
        }
    }

    fn code(self, owned: RxBuffer) -> u8 {
        match (self, owned) {
            (AesPort::Scratch, _) => 0,
            (AesPort::RxBuffer, RxBuffer::Buffer0) => 1,
            (AesPort::RxBuffer, RxBuffer::Buffer1) => 2,
            (AesPort::TxBuffer, _) => 3,
        }
    }

    fn file_id(self, owned: RxBuffer) -> u8 {
        match self {
            AesPort::Scratch => SCRATCH_RAM,
            AesPort::RxBuffer => owned.file_id(),
            AesPort::TxBuffer => TX_BUFFER,
        }
    }
}

/// One AES job
#[derive(Debug)]
pub struct AesJob<'a> {
    /// 11 or 13 bytes for CCM*, 12 bytes for GCM
    pub nonce: &'a [u8],
    /// Authenticated, not encrypted
    ///
    /// Read back from the destination after a decryption.
    pub header: &'a mut [u8],
    /// Encrypted and authenticated, without the MIC
    ///
    /// Read back from the destination after a decryption.
    pub payload: &'a mut [u8],
    /// Where the data is read from
    pub src_port: AesPort,
    /// Where the result goes
    pub dst_port: AesPort,
    /// Must match the configured mode
    pub mode: AesMode,
    /// Must match the configured MIC size
    pub mic_size: MicSize,
}

impl AesJob<'_> {
    fn iv(&self, core: AesCoreType) -> [u8; 16] {
        let mut iv = [0; 16];
        match core {
            AesCoreType::Ccm => {
                let len = self.payload.len() as u16;
                iv[..2].copy_from_slice(&len.to_le_bytes());
                // An 11-byte nonce leaves the two bytes after the length zero
                let start = 15 - self.nonce.len();
                for (byte, nonce) in iv[start..15].iter_mut().zip(self.nonce.iter().rev()) {
                    *byte = *nonce;
                }
            }
            AesCoreType::Gcm => iv[..12].copy_from_slice(self.nonce),
        }
        iv
    }
}

impl<B: Transport> DW3xxx<B> {
    /// Configures the AES block
    ///
    /// The configuration holds until it is changed. Jobs have to agree with
    /// it.
    pub fn configure_aes(&mut self, config: &AesConfig) -> Result<(), Error<B>> {
        self.ll.aes_cfg().write(|w| {
            w.mode(config.mode as u8)
                .key_size(config.key_size as u8)
                .key_addr(config.key_addr)
                .key_load(config.key_load as u8)
                .key_src(config.key_src as u8)
                .tag_size(config.mic as u8)
                .core_sel(config.core_type as u8)
                .key_otp(config.key_otp as u8)
        })?;
        self.radio.aes = Some(*config);
        Ok(())
    }

    /// Loads a key into the `AES_KEY` registers
    ///
    /// Words past the configured key size are ignored by the chip.
    pub fn set_aes_key(&mut self, key: &[u32; 8]) -> Result<(), Error<B>> {
        self.ll.aes_key().write(|w| {
            w.word0(key[0])
                .word1(key[1])
                .word2(key[2])
                .word3(key[3])
                .word4(key[4])
                .word5(key[5])
                .word6(key[6])
                .word7(key[7])
        })?;
        Ok(())
    }

    /// Runs one AES job to completion
    ///
    /// The job is checked against the configuration and the capacity of its
    /// destination before anything is written, so a rejected job leaves the
    /// chip untouched. Returns the final `AES_STS` value.
    pub fn do_aes(&mut self, job: &mut AesJob, core: AesCoreType) -> Result<u8, Error<B>> {
        let config = match self.radio.aes {
            Some(config) => config,
            None => return Err(AesError::WrongMode.into()),
        };
        if job.mode != config.mode || core != config.core_type {
            return Err(AesError::WrongMode.into());
        }
        if job.mic_size != config.mic {
            return Err(AesError::WrongMicSize.into());
        }
        let nonce_fits = match core {
            AesCoreType::Ccm => job.nonce.len() == 11 || job.nonce.len() == 13,
            AesCoreType::Gcm => job.nonce.len() == 12,
        };
        if !nonce_fits {
            return Err(AesError::NonceSize.into());
        }
        if job.payload.len() > MAX_PAYLOAD_LEN {
            return Err(AesError::PayloadSize.into());
        }

        let data_len = job.header.len() + job.payload.len();
        let budget = job
            .dst_port
            .capacity()
            .saturating_sub(job.mic_size.bytes() + FCS_LEN);
        if job.header.len() > MAX_HEADER_LEN || data_len > budget {
            return Err(AesError::DataSize.into());
        }

        let owned = self.radio.owned_buffer;

        let iv = job.iv(core);
        let mut low = [0; 8];
        let mut high = [0; 8];
        low.copy_from_slice(&iv[..8]);
        high.copy_from_slice(&iv[8..]);
        self.ll
            .aes_iv()
            .write(|w| w.low(u64::from_le_bytes(low)).high(u64::from_le_bytes(high)))?;

        // Received data is already in place
        if job.src_port != AesPort::RxBuffer {
            let file_id = job.src_port.file_id(owned);
            if !job.header.is_empty() {
                self.ll.write_at(file_id, 0, job.header)?;
            }
            if !job.payload.is_empty() {
                self.ll.write_at(file_id, job.header.len() as u16, job.payload)?;
            }
        }

        self.ll.dma_cfg().write(|w| {
            w.src_port(job.src_port.code(owned))
                .src_addr(0)
                .dst_port(job.dst_port.code(owned))
                .dst_addr(0)
                .cp_end_sel((core == AesCoreType::Ccm) as u8)
                .hdr_size(job.header.len() as u8)
                .pyld_size(job.payload.len() as u16)
        })?;
        self.ll.aes_start().write(|w| w.value(1))?;

        let mut finished = None;
        for _ in 0..AES_POLLS {
            let status = self.ll.aes_sts().read()?;
            if status.aes_done() == 1 || status.trans_err() == 1 || status.mem_conf() == 1 {
                finished = Some(status);
                break;
            }
        }
        let status = match finished {
            Some(status) => status,
            None => {
                warn!("AES job didn't finish");
                return Err(AesError::Transfer.into());
            }
        };
        self.ll.aes_sts().write(|w| w.value(status.value()))?;

        if status.mem_conf() == 1 {
            return Err(AesError::MemConflict.into());
        }
        if status.trans_err() == 1 {
            return Err(AesError::Transfer.into());
        }
        if status.auth_err() == 1 {
            return Err(AesError::Auth.into());
        }

        if job.mode == AesMode::Decrypt {
            let file_id = job.dst_port.file_id(owned);
            let header_len = job.header.len() as u16;
            if header_len > 0 {
                self.ll.read_at(file_id, 0, job.header)?;
            }
            if !job.payload.is_empty() {
                self.ll.read_at(file_id, header_len, job.payload)?;
            }
        }

        Ok(status.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configs::DoubleBuffer,
        hl::test_support,
        ll::{RX_BUFFER_1, TX_BUFFER},
    };

    static NONCE: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

    fn ccm_encrypt() -> AesConfig {
        AesConfig {
            mic: MicSize::Mic16,
            ..Default::default()
        }
    }

    #[test]
    fn oversized_job_writes_nothing() {
        let mut dw = test_support::idle_rc();
        dw.configure_aes(&ccm_encrypt()).unwrap();
        dw.ll().bus().clear_log();

        let mut header = [0; 20];
        let mut payload = [0; 90];
        let mut job = AesJob {
            nonce: &NONCE,
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::TxBuffer,
            dst_port: AesPort::Scratch,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };

        // 110 bytes, but only 127 - 16 - 2 fit
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::DataSize))));
        assert_eq!(dw.ll().bus().write_count(), 0);

        // One byte less fits
        let mut payload = [0; 89];
        job.payload = &mut payload;
        dw.ll().bus().poke(0x01, 0x50, &[0x01]);
        dw.do_aes(&mut job, AesCoreType::Ccm).unwrap();
    }

    #[test]
    fn job_must_match_configuration() {
        let mut dw = test_support::idle_rc();
        let mut header = [0; 4];
        let mut payload = [0; 4];
        let mut job = AesJob {
            nonce: &NONCE,
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::Scratch,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };

        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::WrongMode))));

        dw.configure_aes(&ccm_encrypt()).unwrap();
        let result = dw.do_aes(&mut job, AesCoreType::Gcm);
        assert!(matches!(result, Err(Error::Aes(AesError::WrongMode))));

        job.mode = AesMode::Decrypt;
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::WrongMode))));

        job.mode = AesMode::Encrypt;
        job.mic_size = MicSize::Mic8;
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::WrongMicSize))));

        let mut long = [0; 1024];
        job.mic_size = MicSize::Mic16;
        job.payload = &mut long;
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::PayloadSize))));
    }

    #[test]
    fn ccm_encrypt_into_tx_buffer() {
        let mut dw = test_support::idle_rc();
        dw.configure_aes(&ccm_encrypt()).unwrap();
        dw.ll().bus().poke(0x01, 0x50, &[0x01]);

        let mut header = [0xA0, 0xA1, 0xA2];
        let mut payload = [0xB0; 20];
        let mut job = AesJob {
            nonce: &NONCE,
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::Scratch,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };
        assert_eq!(dw.do_aes(&mut job, AesCoreType::Ccm).unwrap(), 0x01);

        assert_eq!(
            dw.ll().bus().peek(0x01, 0x34, 16),
            &[20, 0, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]
        );
        assert_eq!(dw.ll().bus().peek(SCRATCH_RAM, 0, 4), &[0xA0, 0xA1, 0xA2, 0xB0]);

        let dma = dw.ll().dma_cfg().read().unwrap();
        assert_eq!(dma.src_port(), 0);
        assert_eq!(dma.dst_port(), 3);
        assert_eq!(dma.cp_end_sel(), 1);
        assert_eq!(dma.hdr_size(), 3);
        assert_eq!(dma.pyld_size(), 20);
        assert_eq!(dw.ll().aes_start().read().unwrap().value(), 1);

        // Status cleared, nothing read back after encryption
        assert_eq!(dw.ll().bus().peek(0x01, 0x50, 1), &[0]);
        assert_eq!(job.header, &[0xA0, 0xA1, 0xA2]);
    }

    #[test]
    fn ccm_short_nonce() {
        let mut dw = test_support::idle_rc();
        dw.configure_aes(&ccm_encrypt()).unwrap();
        dw.ll().bus().poke(0x01, 0x50, &[0x01]);

        let mut header = [0xA0];
        let mut payload = [0xB0; 5];
        let mut job = AesJob {
            nonce: &NONCE[..11],
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::Scratch,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };
        dw.do_aes(&mut job, AesCoreType::Ccm).unwrap();

        assert_eq!(
            dw.ll().bus().peek(0x01, 0x34, 16),
            &[5, 0, 0, 0, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]
        );
    }

    #[test]
    fn nonce_length_is_checked_first() {
        let mut dw = test_support::idle_rc();
        dw.configure_aes(&ccm_encrypt()).unwrap();
        dw.ll().bus().clear_log();

        let mut header = [0; 2];
        let mut payload = [0; 2];
        for len in [0, 10, 12] {
            let mut job = AesJob {
                nonce: &NONCE[..len],
                header: &mut header,
                payload: &mut payload,
                src_port: AesPort::Scratch,
                dst_port: AesPort::TxBuffer,
                mode: AesMode::Encrypt,
                mic_size: MicSize::Mic16,
            };
            let result = dw.do_aes(&mut job, AesCoreType::Ccm);
            assert!(matches!(result, Err(Error::Aes(AesError::NonceSize))));
        }

        dw.configure_aes(&AesConfig {
            core_type: AesCoreType::Gcm,
            mic: MicSize::Mic16,
            ..Default::default()
        })
        .unwrap();
        dw.ll().bus().clear_log();
        let mut job = AesJob {
            nonce: &NONCE,
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::Scratch,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };
        let result = dw.do_aes(&mut job, AesCoreType::Gcm);
        assert!(matches!(result, Err(Error::Aes(AesError::NonceSize))));
        assert_eq!(dw.ll().bus().write_count(), 0);
    }

    #[test]
    fn gcm_decrypt_from_owned_rx_buffer() {
        let mut dw = test_support::idle_pll();
        dw.configure_double_buffer(DoubleBuffer::Manual).unwrap();
        dw.signal_rx_buff_free().unwrap();
        dw.configure_aes(&AesConfig {
            mode: AesMode::Decrypt,
            core_type: AesCoreType::Gcm,
            mic: MicSize::Mic8,
            ..Default::default()
        })
        .unwrap();
        dw.ll().bus().poke(0x01, 0x50, &[0x01]);
        dw.ll().bus().poke(SCRATCH_RAM, 0, &[1, 2, 3, 4, 5, 6]);

        let mut header = [0; 2];
        let mut payload = [0; 4];
        let mut job = AesJob {
            nonce: &NONCE[..12],
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::RxBuffer,
            dst_port: AesPort::Scratch,
            mode: AesMode::Decrypt,
            mic_size: MicSize::Mic8,
        };
        dw.ll().bus().clear_log();
        dw.do_aes(&mut job, AesCoreType::Gcm).unwrap();

        assert_eq!(job.header, &[1, 2]);
        assert_eq!(job.payload, &[3, 4, 5, 6]);
        let iv = dw.ll().bus().peek(0x01, 0x34, 16).to_vec();
        assert_eq!(&iv[..12], &NONCE[..12]);
        assert_eq!(&iv[12..], &[0; 4]);

        let dma = dw.ll().dma_cfg().read().unwrap();
        assert_eq!(dma.src_port(), 2);
        assert_eq!(dma.cp_end_sel(), 0);
        assert_eq!(dw.ll().bus().peek(RX_BUFFER_1, 0, 2), &[0, 0]);
    }

    #[test]
    fn status_errors() {
        let mut dw = test_support::idle_rc();
        dw.configure_aes(&ccm_encrypt()).unwrap();

        let mut header = [0; 2];
        let mut payload = [0; 2];
        let mut job = AesJob {
            nonce: &NONCE,
            header: &mut header,
            payload: &mut payload,
            src_port: AesPort::Scratch,
            dst_port: AesPort::TxBuffer,
            mode: AesMode::Encrypt,
            mic_size: MicSize::Mic16,
        };

        dw.ll().bus().poke(0x01, 0x50, &[0x03]);
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::Auth))));
        assert_eq!(dw.ll().bus().peek(0x01, 0x50, 1), &[0]);

        dw.ll().bus().poke(0x01, 0x50, &[0x08]);
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::MemConflict))));

        // Never finishes
        let result = dw.do_aes(&mut job, AesCoreType::Ccm);
        assert!(matches!(result, Err(Error::Aes(AesError::Transfer))));
        assert_eq!(dw.ll().bus().peek(TX_BUFFER, 0, 2), &[0, 0]);
    }

    #[test]
    fn key_words() {
        let mut dw = test_support::idle_rc();
        dw.set_aes_key(&[1, 2, 3, 4, 5, 6, 7, 0x8000_0000]).unwrap();
        assert_eq!(dw.ll().bus().peek32(0x01, 0x54), 1);
        assert_eq!(dw.ll().bus().peek32(0x01, 0x70), 0x8000_0000);
    }
}
