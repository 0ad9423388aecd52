mod emulation;
mod tc_command;
