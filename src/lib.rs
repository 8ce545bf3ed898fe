/*!
 * The execution core of a small Java virtual machine: the register
 * allocator of its method compiler, and its cooperative thread scheduler.
 */

pub mod util;

pub mod oop;

pub mod config;

pub mod compiler;

pub mod scheduler;
