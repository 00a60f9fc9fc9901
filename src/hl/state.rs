use embedded_hal::delay::DelayNs;

use super::{DeviceState, IrqGuard, RxBuffer, DW3xxx};
use crate::{
    configs::DoubleBuffer,
    ll::{FastCommand, Transport},
    Error,
};

use super::events::SysStatus;

/// `CLK_CTRL.SYS_CLK`: the chip picks the clock
pub(crate) const SYS_CLK_AUTO: u8 = 0;

/// `CLK_CTRL.SYS_CLK`: forced to the free-running oscillator
pub(crate) const SYS_CLK_FOSC: u8 = 1;

impl<B: Transport> DW3xxx<B> {
    /// Moves the chip between IDLE_RC and IDLE_PLL
    ///
    /// Going to IDLE_PLL calibrates the PLL for the configured channel. If
    /// that fails the chip is put back on the RC clock and stays in IDLE_RC.
    /// Requesting the current state does nothing. Any other request returns
    /// [`Error::WrongState`]: leave TX or RX through
    /// [`force_trx_off`](Self::force_trx_off), and sleep through
    /// [`enter_sleep`](Self::enter_sleep).
    pub fn set_state(&mut self, target: DeviceState, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        if target == self.state {
            return Ok(());
        }

        match (self.state, target) {
            (DeviceState::IdleRc, DeviceState::IdlePll) => {
                self.ll.clk_ctrl().modify(|_, w| w.sys_clk(SYS_CLK_AUTO))?;
                self.ll.seq_ctrl().modify(|_, w| w.ainit2idle(1))?;

                let channel = self.radio.channel;
                if let Err(error) = self.calibrate_pll(channel, delay) {
                    self.use_rc_clock()?;
                    return Err(error);
                }

                self.ll.bus().set_fast_rate();
                self.state = DeviceState::IdlePll;
                debug!("IDLE_PLL on {:?}", channel);
                Ok(())
            }
            (DeviceState::IdlePll, DeviceState::IdleRc) => {
                self.use_rc_clock()?;
                self.state = DeviceState::IdleRc;
                debug!("IDLE_RC");
                Ok(())
            }
            _ => Err(Error::WrongState),
        }
    }

    pub(super) fn use_rc_clock(&mut self) -> Result<(), Error<B>> {
        self.ll.clk_ctrl().modify(|_, w| w.sys_clk(SYS_CLK_FOSC))?;
        self.ll.seq_ctrl().modify(|_, w| w.ainit2idle(0))?;
        self.ll.bus().set_slow_rate();
        Ok(())
    }

    /// Turns the transmitter and receiver off
    ///
    /// Runs with the radio interrupt disabled, so a completion event can't
    /// slip in between the command and the status clearing.
    pub fn force_trx_off(&mut self) -> Result<(), Error<B>> {
        let _guard = IrqGuard::new(self.irq);

        self.ll.fast_command(FastCommand::TxRxOff)?;

        let events = SysStatus::ALL_TX
            | SysStatus::ALL_RX_GOOD
            | SysStatus::ALL_RX_ERR
            | SysStatus::ALL_RX_TO
            | SysStatus::HPDWARN;
        self.ll.sys_status().write(|w| w.value(events.bits()))?;

        if self.radio.double_buffer != DoubleBuffer::Disabled {
            self.ll.rdb_status().write(|w| w.value(0xFF))?;
            self.radio.owned_buffer = RxBuffer::Buffer0;
        }

        if self.state == DeviceState::Tx || self.state == DeviceState::Rx {
            self.state = DeviceState::IdlePll;
        }
        self.radio.wait_for_response = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        hl::{test_support, IrqControl, RxMode, TxMode},
        mock::MockDelay,
    };

    #[test]
    fn held_state_is_a_no_op() {
        let mut dw = test_support::idle_rc();
        dw.set_state(DeviceState::IdleRc, &mut MockDelay).unwrap();
        assert!(dw.ll().bus().transactions().is_empty());

        let mut dw = test_support::idle_pll();
        dw.set_state(DeviceState::IdlePll, &mut MockDelay).unwrap();
        assert!(dw.ll().bus().transactions().is_empty());
    }

    #[test]
    fn idle_requests_from_tx_or_rx_fail() {
        let mut dw = test_support::idle_pll();
        dw.start_tx(TxMode::Immediate).unwrap();
        let before = *dw.calibration();
        dw.ll().bus().clear_log();

        for target in [DeviceState::IdleRc, DeviceState::IdlePll] {
            assert!(matches!(
                dw.set_state(target, &mut MockDelay),
                Err(Error::WrongState)
            ));
        }
        assert_eq!(*dw.calibration(), before);
        assert_eq!(dw.ll().bus().write_count(), 0);

        dw.force_trx_off().unwrap();
        dw.rx_enable(RxMode::Immediate).unwrap();
        assert!(matches!(
            dw.set_state(DeviceState::IdleRc, &mut MockDelay),
            Err(Error::WrongState)
        ));
        assert_eq!(dw.state(), DeviceState::Rx);
    }

    #[test]
    fn pll_and_back() {
        let mut dw = test_support::idle_pll();
        assert_eq!(dw.ll().clk_ctrl().read().unwrap().sys_clk(), SYS_CLK_AUTO);
        assert_eq!(dw.ll().seq_ctrl().read().unwrap().ainit2idle(), 1);

        dw.set_state(DeviceState::IdleRc, &mut MockDelay).unwrap();
        assert_eq!(dw.state(), DeviceState::IdleRc);
        assert_eq!(dw.ll().clk_ctrl().read().unwrap().sys_clk(), SYS_CLK_FOSC);
        assert_eq!(dw.ll().seq_ctrl().read().unwrap().ainit2idle(), 0);
    }

    #[test]
    fn failed_lock_stays_on_rc_clock() {
        let mut dw = test_support::idle_rc();
        let result = dw.set_state(DeviceState::IdlePll, &mut MockDelay);

        assert!(matches!(result, Err(Error::PllLock)));
        assert_eq!(dw.state(), DeviceState::IdleRc);
        assert_eq!(dw.ll().clk_ctrl().read().unwrap().sys_clk(), SYS_CLK_FOSC);
        assert_eq!(dw.ll().seq_ctrl().read().unwrap().ainit2idle(), 0);
        assert_eq!(dw.calibration().channel, None);
        assert!(!dw.calibration().locked);
    }

    static DISABLED: AtomicUsize = AtomicUsize::new(0);
    static RESTORED: AtomicUsize = AtomicUsize::new(0);

    struct CountingIrq;

    impl IrqControl for CountingIrq {
        fn disable(&self) -> bool {
            DISABLED.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn restore(&self, was_enabled: bool) {
            assert!(was_enabled);
            RESTORED.fetch_add(1, Ordering::SeqCst);
        }
    }

    static COUNTING_IRQ: CountingIrq = CountingIrq;

    #[test]
    fn force_off_runs_under_irq_guard() {
        let mut dw = test_support::idle_pll();
        dw.set_irq_control(&COUNTING_IRQ);
        dw.configure_double_buffer(DoubleBuffer::Manual).unwrap();
        dw.signal_rx_buff_free().unwrap();
        dw.rx_enable(RxMode::Immediate).unwrap();
        dw.ll().bus().poke(0x01, 0x24, &[0x33]);

        dw.force_trx_off().unwrap();

        assert_eq!(DISABLED.load(Ordering::SeqCst), 1);
        assert_eq!(RESTORED.load(Ordering::SeqCst), 1);
        assert_eq!(dw.state(), DeviceState::IdlePll);
        assert_eq!(dw.owned_buffer(), RxBuffer::Buffer0);
        assert_eq!(dw.ll().bus().peek(0x01, 0x24, 1), &[0]);
    }
}
